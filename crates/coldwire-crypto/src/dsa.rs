//! ML-DSA-87 key generation, signing, and verification.
//!
//! Wraps `libcrux_ml_dsa::ml_dsa_87` (the pure-Rust, formally-verified ML-DSA
//! implementation already used elsewhere in this codebase's lineage for post-quantum
//! signatures) behind the narrow shape this relay actually needs: generate a keypair,
//! sign a message with no context bytes, verify a message against a raw public key.
//!
//! Mirrors `internal/crypto/crypto.go`'s `PublicKeyFromBytes`/`VerifySignature`, adapted
//! from `cloudflare/circl`'s Go API to `libcrux`'s Rust API.

use libcrux_ml_dsa::ml_dsa_87::{
    generate_key_pair, sign, verify, MLDSA87KeyPair, MLDSA87Signature, MLDSA87SigningKey,
    MLDSA87VerificationKey, KEY_GENERATION_RANDOMNESS_SIZE, SIGNING_RANDOMNESS_SIZE,
};
use zeroize::Zeroize;

use coldwire_types::constants::{ML_DSA_87_PK_LEN, ML_DSA_87_SIGN_LEN, ML_DSA_87_SK_LEN};

use crate::error::CryptoError;
use crate::random::secure_random_bytes;

/// No domain-separation context is used anywhere in this protocol: challenges and
/// federation tuples are signed and verified over the raw context-free message, per
/// SPEC_FULL.md §4.1 and §4.2.
const NO_CONTEXT: &[u8] = &[];

/// Callers that end up not needing `signing_key` (an error path, a discarded test fixture)
/// are responsible for zeroizing it themselves; a `Drop` impl here would forbid moving the
/// two fields out independently, which every call site needs to do.
pub struct DsaKeyPair {
    pub signing_key: Vec<u8>,
    pub verification_key: Vec<u8>,
}

/// Generates a fresh ML-DSA-87 keypair. Used once, at server bootstrap, when no
/// private key is present in the configuration file.
pub fn generate_keypair() -> Result<DsaKeyPair, CryptoError> {
    let mut randomness = [0u8; KEY_GENERATION_RANDOMNESS_SIZE];
    randomness.copy_from_slice(&secure_random_bytes(KEY_GENERATION_RANDOMNESS_SIZE));

    let key_pair: MLDSA87KeyPair = generate_key_pair(randomness);
    randomness.zeroize();

    let signing_key = key_pair.signing_key.as_ref().to_vec();
    let verification_key = key_pair.verification_key.as_ref().to_vec();

    debug_assert_eq!(signing_key.len(), ML_DSA_87_SK_LEN);
    debug_assert_eq!(verification_key.len(), ML_DSA_87_PK_LEN);

    Ok(DsaKeyPair {
        signing_key,
        verification_key,
    })
}

/// Signs `message` with `signing_key`, returning the raw 4627-byte signature.
pub fn create_signature(signing_key: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if signing_key.len() != ML_DSA_87_SK_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: ML_DSA_87_SK_LEN,
            actual: signing_key.len(),
        });
    }

    let signing_key = MLDSA87SigningKey::try_from(signing_key)
        .map_err(|_| CryptoError::MalformedKey("signing key"))?;

    let mut randomness = [0u8; SIGNING_RANDOMNESS_SIZE];
    randomness.copy_from_slice(&secure_random_bytes(SIGNING_RANDOMNESS_SIZE));

    let signature = sign(&signing_key, message, NO_CONTEXT, randomness)
        .map_err(|_| CryptoError::SigningFailed)?;
    randomness.zeroize();

    Ok(signature.as_ref().to_vec())
}

/// Verifies `signature` over `message` under `public_key`. Never panics on malformed
/// input — a bad key/signature length or a verification failure are both just `false`,
/// per SPEC_FULL.md §4.1's "surfaced as a boolean, never an exception" requirement.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    if public_key.len() != ML_DSA_87_PK_LEN || signature.len() != ML_DSA_87_SIGN_LEN {
        return false;
    }

    let Ok(verification_key) = MLDSA87VerificationKey::try_from(public_key) else {
        return false;
    };
    let Ok(signature) = MLDSA87Signature::try_from(signature) else {
        return false;
    };

    verify(&verification_key, message, NO_CONTEXT, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let pair = generate_keypair().unwrap();
        let message = b"the quick brown fox";

        let signature = create_signature(&pair.signing_key, message).unwrap();
        assert!(verify_signature(&pair.verification_key, message, &signature));
    }

    #[test]
    fn rejects_signature_over_different_message() {
        let pair = generate_keypair().unwrap();
        let signature = create_signature(&pair.signing_key, b"original").unwrap();
        assert!(!verify_signature(
            &pair.verification_key,
            b"tampered",
            &signature
        ));
    }

    #[test]
    fn rejects_malformed_lengths() {
        assert!(!verify_signature(&[0u8; 10], b"msg", &[0u8; 10]));
    }
}
