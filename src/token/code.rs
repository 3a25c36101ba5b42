//! Exchange token code generation
//!
//! Codes are short enough to read out or type from a phone screen, so the
//! alphabet drops the visually ambiguous I, O, 1 and 0.

use rand::Rng;

/// Upper-case alphanumerics without I, O, 1, 0.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the public token handle.
pub const CODE_LENGTH: usize = 8;

/// Generate a random candidate code. Uniqueness is enforced by the storage
/// layer; callers retry on collision.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_excludes_ambiguous_characters() {
        for c in [b'I', b'O', b'1', b'0'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }
}
