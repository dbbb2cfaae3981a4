//! Short random identifiers for published bundles.

use rand::{Rng, distr::Alphanumeric};

/// Default token length.
pub const DEFAULT_TOKEN_LEN: usize = 6;

/// Generate a random alphanumeric token of `len` characters.
///
/// Each call is independent and performs no uniqueness check;
/// [`crate::bundle::publish`] detects collisions against the store and
/// regenerates.
#[must_use]
pub fn generate(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
