use chrono::{Datelike, Utc};
use rand::Rng;

/// Width of the random part; values are drawn from `0..RANDOM_SPACE`.
pub const RANDOM_SPACE: u32 = 1_000_000;

/// `{prefix}-{year}-{NNNNNN}`, e.g. `TT-2026-004211`.
///
/// Nothing here checks for collisions with numbers already issued. Within one
/// year the space is a million values, so duplicates become likely after a
/// few thousand tickets; uniqueness has to come from a constraint on the
/// tickets table.
pub fn generate(prefix: &str) -> String {
    let mut rng = rand::rng();
    generate_with(prefix, Utc::now().year(), &mut rng)
}

pub fn generate_with<R: Rng>(prefix: &str, year: i32, rng: &mut R) -> String {
    format!("{}-{:04}-{:06}", prefix, year, rng.random_range(0..RANDOM_SPACE))
}

pub fn is_well_formed(prefix: &str, number: &str) -> bool {
    let Some(rest) = number
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };

    match rest.split_once('-') {
        Some((year, random)) => {
            year.len() == 4
                && random.len() == 6
                && year.bytes().all(|b| b.is_ascii_digit())
                && random.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
