//! Short random codes players share to meet in a room.

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Attempts at a given length before the code is made one letter longer.
const ATTEMPTS_PER_LENGTH: usize = 16;

/// Draws a code of `length` letters.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Draws codes until one is not `taken`. If a length keeps colliding the
/// code grows by one letter, so this terminates even when every code of the
/// requested length is live.
pub fn generate_unique<R, F>(rng: &mut R, length: usize, taken: F) -> String
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    let mut length = length.max(1);
    loop {
        for _ in 0..ATTEMPTS_PER_LENGTH {
            let code = generate(rng, length);
            if !taken(&code) {
                return code;
            }
        }
        length += 1;
    }
}
