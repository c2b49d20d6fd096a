//! Secure randomness helpers: random byte strings and rejection-sampled 16-digit user IDs.
//!
//! Mirrors `internal/utils/utils.go`'s `SecureRandomBytes`/`RandomUserId`.

use rand::{Rng, RngCore};

use coldwire_types::constants::USER_ID_LEN;

pub fn secure_random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// A uniformly random 16-digit decimal string. Collisions against existing users are
/// handled by the caller (coldwire-identity), which rejection-samples by retrying this
/// until `Storage::check_user_exists` reports the candidate is free.
pub fn random_user_id() -> String {
    let mut rng = rand::thread_rng();
    (0..USER_ID_LEN)
        .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap())
        .collect()
}

pub fn random_ack_id() -> Vec<u8> {
    secure_random_bytes(coldwire_types::constants::ACK_ID_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_is_sixteen_digits() {
        for _ in 0..100 {
            let id = random_user_id();
            assert_eq!(id.len(), USER_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn random_bytes_are_not_trivially_repeated() {
        let a = secure_random_bytes(64);
        let b = secure_random_bytes(64);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
