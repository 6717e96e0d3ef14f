//! Signature verification.
//!
//! The account never inspects signature bytes itself. It hands the digest and the opaque
//! signature blob to a [`SignatureVerifier`] and compares the recovered identity against the
//! owner or the session key. Alternative schemes (multisig, passkeys) plug in by implementing
//! the trait; the validation control flow does not change.

use core::fmt::Debug;

use alloy_primitives::{eip191_hash_message, keccak256, Address, B256};
use auto_impl::auto_impl;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::constants::signature::ECDSA_SIGNATURE_LENGTH;

/// Errors raised while recovering a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The signature blob has the wrong length for the scheme.
    #[error("invalid signature length {0}")]
    InvalidLength(usize),
    /// The recovery byte is not one of `0`, `1`, `27` or `28`.
    #[error("invalid recovery byte {0}")]
    InvalidRecoveryByte(u8),
    /// `r` or `s` is out of range.
    #[error("malformed signature scalars")]
    MalformedScalars,
    /// No public key could be recovered from the signature.
    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// Recovers the identity that produced a signature over a digest.
#[auto_impl(&, Box, Arc)]
pub trait SignatureVerifier: Debug {
    /// Returns the identity that signed `digest`.
    fn recover_signer(&self, digest: B256, signature: &[u8]) -> Result<Address, SignatureError>;
}

/// secp256k1 recovery over the raw digest, with 65-byte `r || s || v` signatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn recover_signer(&self, digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
        recover_address(digest, signature)
    }
}

/// Applies the EIP-191 personal-message prefix to the digest before delegating to the inner
/// verifier. This is what wallets produce when asked to `personal_sign` an operation hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eip191Verifier<V = EcdsaVerifier> {
    inner: V,
}

impl<V> Eip191Verifier<V> {
    /// Wraps `inner`.
    pub const fn new(inner: V) -> Self {
        Self { inner }
    }
}

impl<V: SignatureVerifier> SignatureVerifier for Eip191Verifier<V> {
    fn recover_signer(&self, digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
        self.inner.recover_signer(eip191_hash_message(digest), signature)
    }
}

/// Recovers the address that produced the 65-byte `r || s || v` signature over `digest`.
///
/// # Algorithm
/// 1. Split the signature into the 64-byte `(r, s)` pair and the recovery byte `v`
/// 2. Normalize `v` (`27`/`28` and `0`/`1` are both accepted) into a recovery id
/// 3. Recover the public key from `(digest, r, s, recovery id)`
/// 4. Compute address = keccak256(uncompressed pubkey without prefix)[12:]
pub fn recover_address(digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != ECDSA_SIGNATURE_LENGTH {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let v = signature[64];
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        _ => return Err(SignatureError::InvalidRecoveryByte(v)),
    };
    let recovery_id =
        RecoveryId::from_byte(parity).ok_or(SignatureError::InvalidRecoveryByte(v))?;

    let signature =
        Signature::from_slice(&signature[..64]).map_err(|_| SignatureError::MalformedScalars)?;

    let recovered_key =
        VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(public_key_to_address(&recovered_key))
}

/// Derives the account identity of a secp256k1 public key.
///
/// The uncompressed point is 65 bytes, `0x04 || x || y`; the identity is the last 20 bytes of
/// `keccak256(x || y)`.
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestSigner;

    #[test]
    fn test_recovers_signer_of_raw_digest() {
        let signer = TestSigner::from_seed(1);
        let digest = keccak256(b"operation");
        let signature = signer.sign_digest(digest);

        assert_eq!(recover_address(digest, &signature).unwrap(), signer.address());
        assert_eq!(EcdsaVerifier.recover_signer(digest, &signature).unwrap(), signer.address());
    }

    #[test]
    fn test_accepts_zero_one_recovery_byte() {
        let signer = TestSigner::from_seed(2);
        let digest = keccak256(b"parity");
        let mut signature = signer.sign_digest(digest).to_vec();
        signature[64] -= 27;

        assert_eq!(recover_address(digest, &signature).unwrap(), signer.address());
    }

    #[test]
    fn test_other_digest_recovers_other_identity() {
        let signer = TestSigner::from_seed(3);
        let signature = signer.sign_digest(keccak256(b"a"));
        let recovered = recover_address(keccak256(b"b"), &signature);
        assert_ne!(recovered, Ok(signer.address()));
    }

    #[test]
    fn test_rejects_bad_length_and_recovery_byte() {
        let digest = keccak256(b"x");
        assert_eq!(recover_address(digest, &[0u8; 64]), Err(SignatureError::InvalidLength(64)));

        let mut signature = TestSigner::from_seed(4).sign_digest(digest);
        signature[64] = 29;
        assert_eq!(
            recover_address(digest, &signature),
            Err(SignatureError::InvalidRecoveryByte(29))
        );
    }

    #[test]
    fn test_rejects_zero_scalars() {
        let mut signature = [0u8; 65];
        signature[64] = 27;
        assert_eq!(
            recover_address(keccak256(b"x"), &signature),
            Err(SignatureError::MalformedScalars)
        );
    }

    #[test]
    fn test_eip191_verifier_expects_prefixed_digest() {
        let signer = TestSigner::from_seed(5);
        let digest = keccak256(b"user op");
        let personal = signer.sign_digest(eip191_hash_message(digest));

        let verifier = Eip191Verifier::new(EcdsaVerifier);
        assert_eq!(verifier.recover_signer(digest, &personal).unwrap(), signer.address());
        assert_ne!(EcdsaVerifier.recover_signer(digest, &personal), Ok(signer.address()));
    }
}
