use alloy_primitives::{keccak256, Address, Bytes, B256};
use k256::ecdsa::SigningKey;

use crate::verifier::public_key_to_address;

/// A deterministic secp256k1 key for tests.
#[derive(Debug, Clone)]
pub struct TestSigner {
    key: SigningKey,
    address: Address,
}

impl TestSigner {
    /// Wraps a secret key. Returns `None` if `secret` is not a valid scalar.
    pub fn from_secret(secret: B256) -> Option<Self> {
        let key = SigningKey::from_slice(secret.as_slice()).ok()?;
        let address = public_key_to_address(key.verifying_key());
        Some(Self { key, address })
    }

    /// Derives a key from `seed`. Equal seeds give equal keys.
    pub fn from_seed(seed: u64) -> Self {
        let mut attempt = 0u64;
        loop {
            let mut preimage = [0u8; 16];
            preimage[..8].copy_from_slice(&seed.to_be_bytes());
            preimage[8..].copy_from_slice(&attempt.to_be_bytes());
            if let Some(signer) = Self::from_secret(keccak256(preimage)) {
                return signer;
            }
            attempt += 1;
        }
    }

    /// The identity of the key.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Signs `digest` without any prefix, returning `r || s || v` with `v` in `{27, 28}`.
    pub fn sign_digest(&self, digest: B256) -> [u8; 65] {
        let (signature, recovery_id) =
            self.key.sign_prehash_recoverable(digest.as_slice()).expect("signing never fails");
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        out
    }

    /// Signs `digest` and returns the signature as [`Bytes`].
    pub fn sign_bytes(&self, digest: B256) -> Bytes {
        Bytes::copy_from_slice(&self.sign_digest(digest))
    }
}
