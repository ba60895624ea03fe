use crate::{Error, SharedSecret};
use aes_gcm_siv::aead::Aead;
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use base64::Engine;
use rand::TryRngCore;
use rand::rngs::OsRng;

/// AES-GCM-SIV uses 12-byte (96-bit) nonces.
pub const NONCE_SIZE: usize = 12;

/// An encrypted message payload.
///
/// Wire format: `base64(nonce[12] || ciphertext || tag[16])`, carried as the
/// `content` of a `CHAT` event. The cipher is AES-256-GCM-SIV, whose tag and
/// keystream differ from plain AES-GCM, so envelopes do not interoperate with
/// AES-GCM clients even though the framing is the same.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Nonce used for this encryption.
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Ciphertext with the authentication tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Concatenates nonce and ciphertext.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);

        bytes
    }

    /// Splits the fixed-length nonce prefix from the ciphertext.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < NONCE_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "{} bytes is shorter than the {NONCE_SIZE}-byte nonce",
                bytes.len()
            )));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Encodes the envelope as transport-safe text.
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Decodes an envelope from its text form.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|err| Error::MalformedEnvelope(err.to_string()))?;

        Self::from_bytes(&bytes)
    }
}

/// Encrypts `plaintext` under `secret` with a freshly drawn random nonce.
pub fn encrypt(secret: &SharedSecret, plaintext: &[u8]) -> Result<EncryptedEnvelope, Error> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|_| Error::Random)?;

    let key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(secret.as_bytes());
    let cipher = Aes256GcmSiv::new(key);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("Message encryption failed".to_string()))?;

    Ok(EncryptedEnvelope { nonce, ciphertext })
}

/// Decrypts an envelope, failing closed on any authentication error.
///
/// Never returns partial plaintext: a tampered nonce, ciphertext or tag, or a
/// wrong key, all surface as [`Error::Decryption`].
pub fn decrypt(secret: &SharedSecret, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, Error> {
    let key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(secret.as_bytes());
    let cipher = Aes256GcmSiv::new(key);

    let plaintext = cipher.decrypt(
        Nonce::from_slice(&envelope.nonce),
        envelope.ciphertext.as_slice(),
    )?;

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, KeyPair, derive_shared_secret};
    use proptest::prelude::*;

    fn secret_pair() -> (SharedSecret, SharedSecret) {
        let config = EngineConfig::default();
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();

        let ab = derive_shared_secret(&alice, bob.public_key(), &config.kdf_salt, &config.kdf_info)
            .unwrap();
        let ba = derive_shared_secret(&bob, alice.public_key(), &config.kdf_salt, &config.kdf_info)
            .unwrap();

        (ab, ba)
    }

    #[test]
    fn test_reciprocal_secrets_round_trip() {
        let (alice_side, bob_side) = secret_pair();

        let envelope = encrypt(&alice_side, b"hello").unwrap();
        let wire = envelope.encode();

        let received = EncryptedEnvelope::decode(&wire).unwrap();
        assert_eq!(decrypt(&bob_side, &received).unwrap(), b"hello");
    }

    #[test]
    fn test_nonces_are_fresh() {
        let (secret, _) = secret_pair();

        let first = encrypt(&secret, b"same message").unwrap();
        let second = encrypt(&secret, b"same message").unwrap();

        assert_ne!(first.nonce(), second.nonce());
        assert_ne!(first.encode(), second.encode());
        assert_eq!(decrypt(&secret, &first).unwrap(), b"same message");
        assert_eq!(decrypt(&secret, &second).unwrap(), b"same message");
    }

    #[test]
    fn test_wrong_key_fails() {
        let (secret, _) = secret_pair();
        let (other, _) = secret_pair();

        let envelope = encrypt(&secret, b"for bob only").unwrap();
        assert!(matches!(
            decrypt(&other, &envelope),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; NONCE_SIZE - 1]);
        assert!(matches!(
            EncryptedEnvelope::decode(&short),
            Err(Error::MalformedEnvelope(_))
        ));

        assert!(matches!(
            EncryptedEnvelope::decode("not base64!"),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_bare_nonce_fails_authentication() {
        let (secret, _) = secret_pair();
        let envelope = EncryptedEnvelope::from_bytes(&[7u8; NONCE_SIZE]).unwrap();

        assert!(envelope.ciphertext().is_empty());
        assert!(matches!(
            decrypt(&secret, &envelope),
            Err(Error::Decryption(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let (alice_side, bob_side) = secret_pair();

            let envelope = encrypt(&alice_side, &plaintext).unwrap();
            let decoded = EncryptedEnvelope::decode(&envelope.encode()).unwrap();

            prop_assert_eq!(decrypt(&bob_side, &decoded).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_flipped_byte_is_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..128),
            position in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let (secret, _) = secret_pair();

            let mut bytes = encrypt(&secret, &plaintext).unwrap().to_bytes();
            let index = position.index(bytes.len());
            bytes[index] ^= flip;

            let tampered = EncryptedEnvelope::from_bytes(&bytes).unwrap();
            prop_assert!(matches!(decrypt(&secret, &tampered), Err(Error::Decryption(_))));
        }
    }
}
