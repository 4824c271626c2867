//! Key pairs and detached signatures over 32-byte transaction digests.
//!
//! An address is the hex encoding of an Ed25519 verifying key. There is no
//! checksum or hashing step between the two, so a mistyped address is only
//! caught when it fails to decode as a curve point.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;

use crate::error::{LedgerError, Result};
use crate::Hash;

#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| LedgerError::InvalidKey(format!("secret key is not hex: {e}")))?;
        let bytes: [u8; SECRET_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            LedgerError::InvalidKey(format!("secret key must be {SECRET_KEY_LENGTH} bytes"))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn address(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign a digest, returning the hex-encoded 64-byte signature.
    pub fn sign_digest(&self, digest: &Hash) -> Result<String> {
        let signature = self
            .signing_key
            .try_sign(digest)
            .map_err(|e| LedgerError::SigningError(e.to_string()))?;
        Ok(hex::encode(signature.to_bytes()))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn verifying_key_from_address(address: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(address)
        .map_err(|e| LedgerError::InvalidKey(format!("address is not hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| LedgerError::InvalidKey("address must encode 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| LedgerError::InvalidKey(e.to_string()))
}

/// True iff `signature_hex` is a valid signature of `digest` by the key that
/// `address` encodes. Malformed inputs verify as false.
pub fn verify_digest(address: &str, digest: &Hash, signature_hex: &str) -> bool {
    let Ok(key) = verifying_key_from_address(address) else {
        return false;
    };
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.verify(digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PUBLIC_KEY_HEX_SIZE, SIGNATURE_HEX_SIZE};
    use crate::sha256;

    #[test]
    fn address_is_hex_public_key() {
        let keys = Keypair::generate();
        let address = keys.address();
        assert_eq!(address.len(), PUBLIC_KEY_HEX_SIZE);
        assert!(verifying_key_from_address(&address).is_ok());
    }

    #[test]
    fn generated_addresses_differ() {
        assert_ne!(Keypair::generate().address(), Keypair::generate().address());
    }

    #[test]
    fn secret_hex_round_trip_keeps_address() {
        let keys = Keypair::generate();
        let restored = Keypair::from_secret_hex(&keys.secret_hex()).unwrap();
        assert_eq!(keys.address(), restored.address());
    }

    #[test]
    fn from_secret_hex_rejects_bad_input() {
        assert!(matches!(
            Keypair::from_secret_hex("zz"),
            Err(LedgerError::InvalidKey(_))
        ));
        assert!(matches!(
            Keypair::from_secret_hex("abcd"),
            Err(LedgerError::InvalidKey(_))
        ));
    }

    #[test]
    fn sign_and_verify_digest() {
        let keys = Keypair::generate();
        let digest = sha256(b"Hello, Blockchain!");
        let signature = keys.sign_digest(&digest).unwrap();
        assert_eq!(signature.len(), SIGNATURE_HEX_SIZE);
        assert!(verify_digest(&keys.address(), &digest, &signature));

        let other = sha256(b"Hello, Blockchain?");
        assert!(!verify_digest(&keys.address(), &other, &signature));
    }

    #[test]
    fn verify_with_wrong_key_fails() {
        let signer = Keypair::generate();
        let stranger = Keypair::generate();
        let digest = sha256(b"payload");
        let signature = signer.sign_digest(&digest).unwrap();
        assert!(!verify_digest(&stranger.address(), &digest, &signature));
    }

    #[test]
    fn malformed_inputs_do_not_verify() {
        let keys = Keypair::generate();
        let digest = sha256(b"payload");
        let signature = keys.sign_digest(&digest).unwrap();
        assert!(!verify_digest("not-hex", &digest, &signature));
        assert!(!verify_digest(&keys.address(), &digest, "00ff"));
        assert!(!verify_digest(&keys.address(), &digest, "xyz"));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let keys = Keypair::generate();
        let rendered = format!("{keys:?}");
        assert!(rendered.contains(&keys.address()));
        assert!(!rendered.contains(&keys.secret_hex()));
    }
}
