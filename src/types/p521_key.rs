use crate::Error;
use base64::Engine;
use p521::elliptic_curve::ecdh::{SharedSecret, diffie_hellman};
use p521::elliptic_curve::sec1::ToEncodedPoint;
use p521::{NistP521, PublicKey, SecretKey};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Byte length of an encoded P-521 scalar.
const SCALAR_SIZE: usize = 66;

/// Candidates are 521-bit values, so almost all of them are below the group
/// order. Running out of attempts means the entropy source is broken.
const MAX_SCALAR_ATTEMPTS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P521PublicKey(PublicKey);

impl P521PublicKey {
    /// Parses a JSON Web Key carrying a P-521 public point.
    pub fn from_jwk(jwk: &str) -> Result<Self, Error> {
        PublicKey::from_jwk_str(jwk)
            .map(Self)
            .map_err(|err| Error::Serde(format!("invalid P-521 JWK: {err}")))
    }

    /// Encodes the point as a JSON Web Key string.
    pub fn to_jwk(&self) -> String {
        self.0.to_jwk_string()
    }

    /// Compressed SEC1 encoding of the point.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Short, loggable identifier for the key.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.to_sec1_bytes());
        base64::engine::general_purpose::STANDARD_NO_PAD.encode(&digest[..12])
    }
}

impl From<PublicKey> for P521PublicKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl AsRef<PublicKey> for P521PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

/// P-521 private scalar. The inner key zeroizes itself on drop.
#[derive(Clone)]
pub struct P521Secret(SecretKey);

impl P521Secret {
    /// Draws a fresh scalar from the OS entropy source.
    pub(crate) fn generate() -> Result<Self, Error> {
        let mut candidate = Zeroizing::new([0u8; SCALAR_SIZE]);

        for _ in 0..MAX_SCALAR_ATTEMPTS {
            OsRng
                .try_fill_bytes(candidate.as_mut_slice())
                .map_err(|_| Error::Random)?;
            // Only the low bit of the leading byte is part of a 521-bit scalar.
            candidate[0] &= 0x01;

            if let Ok(secret) = SecretKey::from_slice(candidate.as_slice()) {
                return Ok(Self(secret));
            }
        }

        Err(Error::KeyGeneration(
            "no valid P-521 scalar from entropy source".to_string(),
        ))
    }

    pub(crate) fn public_key(&self) -> P521PublicKey {
        self.0.public_key().into()
    }

    pub(crate) fn dh(&self, public_key: &P521PublicKey) -> SharedSecret<NistP521> {
        diffie_hellman(self.0.to_nonzero_scalar(), public_key.0.as_affine())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dh_is_symmetric() {
        let alice = P521Secret::generate().unwrap();
        let bob = P521Secret::generate().unwrap();

        let ab = alice.dh(&bob.public_key());
        let ba = bob.dh(&alice.public_key());

        assert_eq!(ab.raw_secret_bytes(), ba.raw_secret_bytes());
    }

    #[test]
    fn test_jwk_round_trip() {
        let secret = P521Secret::generate().unwrap();
        let public = secret.public_key();

        let jwk = public.to_jwk();
        assert!(jwk.contains("\"crv\":\"P-521\""));
        assert!(!jwk.contains("\"d\""), "JWK must not carry the private scalar");

        let parsed = P521PublicKey::from_jwk(&jwk).unwrap();
        assert_eq!(parsed, public);
        assert_eq!(parsed.fingerprint(), public.fingerprint());
    }

    #[test]
    fn test_invalid_jwk_rejected() {
        assert!(matches!(
            P521PublicKey::from_jwk("{\"kty\":\"EC\",\"crv\":\"P-256\"}"),
            Err(Error::Serde(_))
        ));
        assert!(P521PublicKey::from_jwk("not json").is_err());
    }
}
