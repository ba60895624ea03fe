use crate::{EngineConfig, Error, KeyPair, P521PublicKey, PeerDirectory};
use hkdf::Hkdf;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OnceCell};
use zeroize::Zeroizing;

/// Byte length of the derived AEAD key.
pub const SHARED_SECRET_SIZE: usize = 32;

/// Symmetric key shared with exactly one peer for the lifetime of a session.
///
/// Both ends derive byte-identical keys from reciprocal key-agreement inputs.
/// The key bytes are wiped when the last reference is dropped.
pub struct SharedSecret(Zeroizing<[u8; SHARED_SECRET_SIZE]>);

impl SharedSecret {
    pub(crate) fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

/// Derives the symmetric key for one peer.
///
/// Runs ECDH between the local private scalar and the peer's public point,
/// then expands the raw x-coordinate through HKDF-SHA256. The raw agreed bytes
/// are never used as a key directly.
pub fn derive_shared_secret(
    key_pair: &KeyPair,
    peer_public: &P521PublicKey,
    salt: &[u8],
    info: &[u8],
) -> Result<SharedSecret, Error> {
    let agreed = key_pair.agree(peer_public);
    let hkdf = Hkdf::<Sha256>::new(Some(salt), agreed.raw_secret_bytes());

    let mut key = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
    hkdf.expand(info, key.as_mut_slice())
        .map_err(|err| Error::Derivation(err.to_string()))?;

    Ok(SharedSecret(key))
}

type Slot = Arc<OnceCell<Arc<SharedSecret>>>;

#[derive(Default)]
struct CacheState {
    generation: u64,
    slots: HashMap<String, Slot>,
}

/// Per-peer memo of derived secrets.
///
/// Each peer owns one slot. Concurrent callers for the same peer wait on the
/// slot's single in-flight derivation and all receive the same secret. A failed
/// derivation leaves the slot empty, so the next caller retries.
///
/// Slots belong to a generation, which [`SharedSecretCache::clear`] advances.
/// Callers holding an older generation cannot create slots in the new one.
pub struct SharedSecretCache {
    kdf_salt: Vec<u8>,
    kdf_info: Vec<u8>,
    state: Mutex<CacheState>,
    derivations: AtomicUsize,
}

impl SharedSecretCache {
    /// Creates an empty cache using the HKDF parameters from `config`.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            kdf_salt: config.kdf_salt.clone(),
            kdf_info: config.kdf_info.clone(),
            state: Mutex::new(CacheState::default()),
            derivations: AtomicUsize::new(0),
        }
    }

    /// Current generation.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Returns the cached secret for `peer`, deriving it on first use.
    ///
    /// The peer's key is read from `directory` at derivation time, so callers
    /// always see the current snapshot. Fails with
    /// [`Error::PeerKeyUnavailable`] when the peer is unknown or has not
    /// published a key, and with [`Error::NoSession`] when `generation` has
    /// been cleared.
    pub async fn get_or_derive(
        &self,
        generation: u64,
        key_pair: &Arc<KeyPair>,
        directory: &PeerDirectory,
        peer: &str,
    ) -> Result<Arc<SharedSecret>, Error> {
        let slot = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return Err(Error::NoSession);
            }
            Arc::clone(state.slots.entry(peer.to_string()).or_default())
        };

        slot.get_or_try_init(|| self.derive_for(key_pair, directory, peer))
            .await
            .map(Arc::clone)
    }

    /// Drops the cached secret for `peer`, if any.
    pub async fn invalidate(&self, peer: &str) {
        if self.state.lock().await.slots.remove(peer).is_some() {
            tracing::debug!(peer, "shared secret invalidated");
        }
    }

    /// Drops every cached secret and starts a new generation, which is
    /// returned.
    ///
    /// Derivations still in flight finish into detached slots and are never
    /// served from the new generation.
    pub async fn clear(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.slots.clear();
        state.generation = state.generation.wrapping_add(1);
        state.generation
    }

    /// Whether a derived secret is currently cached for `peer`.
    pub async fn contains(&self, peer: &str) -> bool {
        self.state
            .lock()
            .await
            .slots
            .get(peer)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of key agreements this cache has performed.
    pub fn derivations(&self) -> usize {
        self.derivations.load(Ordering::Relaxed)
    }

    async fn derive_for(
        &self,
        key_pair: &Arc<KeyPair>,
        directory: &PeerDirectory,
        peer: &str,
    ) -> Result<Arc<SharedSecret>, Error> {
        let encoded = directory
            .lookup(peer)
            .await
            .and_then(|record| record.public_key)
            .ok_or_else(|| Error::PeerKeyUnavailable(peer.to_string()))?;

        let peer_public =
            P521PublicKey::from_jwk(&encoded).map_err(|err| Error::Derivation(err.to_string()))?;
        let fingerprint = peer_public.fingerprint();

        let key_pair = Arc::clone(key_pair);
        let salt = self.kdf_salt.clone();
        let info = self.kdf_info.clone();
        let secret = tokio::task::spawn_blocking(move || {
            derive_shared_secret(&key_pair, &peer_public, &salt, &info)
        })
        .await
        .map_err(|err| Error::Derivation(err.to_string()))??;

        self.derivations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(peer, key = %fingerprint, "derived shared secret");

        Ok(Arc::new(secret))
    }
}
