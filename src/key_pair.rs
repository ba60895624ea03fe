use crate::{Error, P521PublicKey, P521Secret};
use p521::NistP521;
use p521::elliptic_curve::ecdh::SharedSecret;
use std::fmt;

/// Ephemeral ECDH key pair owned by one authenticated session.
///
/// The private half never leaves this type: there is no export, no
/// serialization and no `Debug` output for it. Dropping the pair wipes the
/// scalar, which is what makes traffic of a closed session unreadable.
pub struct KeyPair {
    secret: P521Secret,
    public: P521PublicKey,
}

impl KeyPair {
    /// Generates a fresh P-521 key pair from OS entropy.
    ///
    /// Fails with [`Error::KeyGeneration`] or [`Error::Random`]; either one
    /// must abort session establishment.
    pub fn generate() -> Result<Self, Error> {
        let secret = P521Secret::generate()?;
        let public = secret.public_key();

        Ok(Self { secret, public })
    }

    /// Returns the public half.
    pub fn public_key(&self) -> &P521PublicKey {
        &self.public
    }

    /// Serializes the public half for directory publication.
    pub fn export_public(&self) -> String {
        self.public.to_jwk()
    }

    pub(crate) fn agree(&self, peer_public: &P521PublicKey) -> SharedSecret<NistP521> {
        self.secret.dh(peer_public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.fingerprint())
            .finish_non_exhaustive()
    }
}
