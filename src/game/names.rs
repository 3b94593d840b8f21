//! Display name generation

use rand::seq::SliceRandom;
use rand::Rng;

const FIRST: &[&str] = &[
    "Ada", "Boris", "Carla", "Dmitri", "Elena", "Felix", "Greta", "Hugo", "Ines", "Jonas",
    "Katya", "Leon", "Mira", "Nils", "Olga", "Pavel", "Rosa", "Stefan", "Tanja", "Viktor",
];

const LAST: &[&str] = &[
    "Abbott", "Brandt", "Castillo", "Dorn", "Eriksen", "Fischer", "Gallo", "Horvat", "Ivanov",
    "Jensen", "Kowalski", "Lindqvist", "Moreau", "Novak", "Orlov", "Petrov", "Quinn", "Romero",
    "Sokolov", "Weber",
];

/// "First Last" drawn from the built-in lists
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = FIRST.choose(rng).copied().unwrap_or("Anon");
    let last = LAST.choose(rng).copied().unwrap_or("Player");
    format!("{first} {last}")
}
