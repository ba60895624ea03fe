use crate::{Error, KeyPair};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Identity returned by the authentication collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// The authentication collaborator.
///
/// `login` verifies credentials and records `public_key` in the caller's
/// roster entry so peers can resolve it.
pub trait Authenticator {
    fn login(
        &self,
        identifier: &str,
        password: &str,
        public_key: &str,
    ) -> impl Future<Output = Result<AuthenticatedUser, Error>> + Send;
}

/// An authenticated user together with the key pair generated for this login.
///
/// Lives in memory only. Dropping the last handle destroys the private key,
/// after which traffic of this session can no longer be decrypted.
#[derive(Clone, Debug)]
pub struct Session {
    user: AuthenticatedUser,
    key_pair: Arc<KeyPair>,
}

impl Session {
    /// Logs in with a freshly generated key pair.
    ///
    /// The key pair is generated before the authenticator is contacted; a
    /// generation failure aborts the login without sending credentials.
    pub async fn establish<A: Authenticator>(
        authenticator: &A,
        identifier: &str,
        password: &str,
    ) -> Result<Self, Error> {
        let key_pair = generate_key_pair().await?;
        let public_key = key_pair.export_public();

        let user = authenticator
            .login(identifier, password, &public_key)
            .await?;

        tracing::info!(
            user = %user.username,
            key = %key_pair.public_key().fingerprint(),
            "session established"
        );

        Ok(Self::new(user, key_pair))
    }

    /// Wraps an already published key pair.
    pub fn new(user: AuthenticatedUser, key_pair: KeyPair) -> Self {
        Self {
            user,
            key_pair: Arc::new(key_pair),
        }
    }

    pub fn user(&self) -> &AuthenticatedUser {
        &self.user
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn key_pair(&self) -> &Arc<KeyPair> {
        &self.key_pair
    }
}

/// Generates a key pair off the async executor.
pub async fn generate_key_pair() -> Result<KeyPair, Error> {
    tokio::task::spawn_blocking(KeyPair::generate)
        .await
        .map_err(|err| Error::KeyGeneration(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::P521PublicKey;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAuthenticator {
        published: Mutex<Vec<String>>,
    }

    impl Authenticator for RecordingAuthenticator {
        async fn login(
            &self,
            identifier: &str,
            password: &str,
            public_key: &str,
        ) -> Result<AuthenticatedUser, Error> {
            if password != "hunter2" {
                return Err(Error::Authentication("Invalid credentials".to_string()));
            }

            self.published.lock().unwrap().push(public_key.to_string());
            Ok(AuthenticatedUser {
                username: identifier.to_string(),
                email: None,
            })
        }
    }

    #[tokio::test]
    async fn test_login_publishes_session_key() {
        let authenticator = RecordingAuthenticator::default();

        let session = Session::establish(&authenticator, "alice", "hunter2")
            .await
            .unwrap();

        assert_eq!(session.username(), "alice");
        let published = authenticator.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(
            &P521PublicKey::from_jwk(&published[0]).unwrap(),
            session.key_pair().public_key()
        );
    }

    #[tokio::test]
    async fn test_each_login_gets_a_new_key() {
        let authenticator = RecordingAuthenticator::default();

        let first = Session::establish(&authenticator, "alice", "hunter2")
            .await
            .unwrap();
        let second = Session::establish(&authenticator, "alice", "hunter2")
            .await
            .unwrap();

        assert_ne!(
            first.key_pair().public_key(),
            second.key_pair().public_key()
        );
    }

    #[tokio::test]
    async fn test_rejected_login_is_fatal() {
        let authenticator = RecordingAuthenticator::default();

        let err = Session::establish(&authenticator, "alice", "wrong")
            .await
            .unwrap_err();

        assert_eq!(err, Error::Authentication("Invalid credentials".to_string()));
        assert!(!err.is_recoverable());
        assert!(authenticator.published.lock().unwrap().is_empty());
    }
}
