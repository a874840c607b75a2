//! Keypair management for the funder and channel accounts

use anyhow::{Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use stellar_strkey::ed25519;
use stellar_xdr::curr::{DecoratedSignature, Signature, SignatureHint};
use zeroize::Zeroize;

use crate::address::encode_account;

/// An ed25519 keypair able to sign ledger transactions
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: String,
}

impl Keypair {
    /// Parse a keypair from an `S...` secret seed
    pub fn from_secret(secret: &str) -> Result<Self> {
        let mut seed = ed25519::PrivateKey::from_string(secret)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("Invalid secret seed")?;
        let keypair = Self::from_seed_bytes(&seed.0);
        seed.0.zeroize();
        Ok(keypair)
    }

    /// Generate a fresh random keypair
    pub fn random() -> Self {
        let mut seed: [u8; 32] = rand::random();
        let keypair = Self::from_seed_bytes(&seed);
        seed.zeroize();
        keypair
    }

    fn from_seed_bytes(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let address = encode_account(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// The `G...` address of this keypair
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a payload and wrap it with the key's signature hint
    pub fn sign_decorated(&self, payload: &[u8]) -> Result<DecoratedSignature> {
        let signature = self.signing_key.sign(payload);
        let public = self.public_key_bytes();
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&public[28..]);
        Ok(DecoratedSignature {
            hint: SignatureHint(hint),
            signature: Signature(
                signature
                    .to_bytes()
                    .to_vec()
                    .try_into()
                    .context("Signature does not fit XDR bounds")?,
            ),
        })
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};

    const BOT_SEED: &str = "SCWNLYELENPBXN46FHYXETT5LJCYBZD5VUQQVW4KZPHFO2YTQJUWT4D5";

    #[test]
    fn test_seed_derives_stable_address() {
        let kp = Keypair::from_secret(BOT_SEED).unwrap();
        assert!(kp.address().starts_with('G'));
        assert_eq!(kp.address(), Keypair::from_secret(BOT_SEED).unwrap().address());
        let decoded = ed25519::PublicKey::from_string(kp.address()).unwrap();
        assert_eq!(decoded.0, kp.public_key_bytes());
    }

    #[test]
    fn test_rejects_public_key_as_secret() {
        let kp = Keypair::random();
        assert!(Keypair::from_secret(kp.address()).is_err());
    }

    #[test]
    fn test_random_keypairs_differ() {
        assert_ne!(Keypair::random().address(), Keypair::random().address());
    }

    #[test]
    fn test_decorated_signature_verifies() {
        let kp = Keypair::random();
        let payload = b"payload";
        let decorated = kp.sign_decorated(payload).unwrap();
        assert_eq!(decorated.hint.0, kp.public_key_bytes()[28..]);

        let verifying = VerifyingKey::from_bytes(&kp.public_key_bytes()).unwrap();
        let bytes: [u8; 64] = decorated.signature.0.to_vec().try_into().unwrap();
        let sig = ed25519_dalek::Signature::from_bytes(&bytes);
        assert!(verifying.verify(payload, &sig).is_ok());
    }
}
