//! ML-DSA-87 signing/verification, HMAC-SHA-512 bearer tokens, and the secure
//! randomness helpers the rest of the relay is built on.

pub mod dsa;
pub mod error;
pub mod random;
pub mod token;

pub use dsa::{create_signature, generate_keypair, verify_signature, DsaKeyPair};
pub use error::CryptoError;
pub use random::{random_ack_id, random_user_id, secure_random_bytes};
pub use token::{mint_token, verify_token, Claims};
