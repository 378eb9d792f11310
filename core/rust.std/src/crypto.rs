use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generates a random alphanumeric string of the given length
pub fn gen_random(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
