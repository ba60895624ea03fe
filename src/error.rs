/// Errors that can occur while establishing a session or moving messages.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The session key pair could not be generated.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// The peer has no published public key in the directory.
    #[error("No public key available for peer '{0}'")]
    PeerKeyUnavailable(String),

    /// Key agreement or key derivation failed.
    #[error("Shared secret derivation failed: {0}")]
    Derivation(String),

    /// A cryptographic operation failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Authenticated decryption failed.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The envelope could not be decoded into nonce and ciphertext.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// No authenticated session is active.
    #[error("No active session")]
    NoSession,

    /// The transport collaborator rejected a publish.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The roster collaborator could not list users.
    #[error("Roster error: {0}")]
    Roster(String),

    /// The authentication collaborator rejected the login.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),
}

impl Error {
    /// Whether the caller can keep the session alive after this error.
    ///
    /// Fatal errors only occur while a session is being established.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::KeyGeneration(_) | Self::Authentication(_) | Self::Random
        )
    }

    /// Whether this error should be rendered as an undecryptable entry.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, Self::Decryption(_) | Self::MalformedEnvelope(_))
    }
}

impl From<aes_gcm_siv::Error> for Error {
    fn from(value: aes_gcm_siv::Error) -> Self {
        Self::Decryption(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value.to_string())
    }
}
