use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Length of a generated paste id.
pub const ID_LENGTH: usize = 6;

/// Generate a random paste id from `[a-zA-Z0-9]`.
///
/// Ids are not guaranteed to be unique; inserting resolves collisions.
pub fn generate_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}
