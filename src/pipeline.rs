use crate::{
    ChatEvent, ConversationEntry, ConversationStore, DirectorySnapshot, Direction, EncryptedEnvelope,
    EngineConfig, EntryContent, Error, EventKind, PeerDirectory, Roster, Session, SharedSecret,
    SharedSecretCache, Transport, decrypt, encrypt,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The session currently driving the pipeline, tagged with the store epoch
/// and cache generation it works in.
struct ActiveSession {
    session: Session,
    epoch: u64,
    generation: u64,
}

/// Send and receive paths of the end-to-end encrypted messenger.
///
/// The pipeline owns the peer directory, the shared-secret cache and the
/// conversation store, and reads them live on every call. A long-lived
/// transport callback can therefore hold `&MessagePipeline` (or an `Arc`) and
/// always observe the current session and peer set.
///
/// Entries are appended in the order their operations complete. Two inbound
/// events may land in the opposite order from their arrival when the first
/// one waits on a slower key derivation.
pub struct MessagePipeline<T, R> {
    config: EngineConfig,
    transport: T,
    roster: R,
    directory: PeerDirectory,
    cache: SharedSecretCache,
    store: ConversationStore,
    active: RwLock<Option<Arc<ActiveSession>>>,
}

impl<T: Transport, R: Roster> MessagePipeline<T, R> {
    /// Creates an idle pipeline. Nothing can be sent until a session starts.
    pub fn new(transport: T, roster: R, config: Option<EngineConfig>) -> Self {
        let config = config.unwrap_or_default();
        let cache = SharedSecretCache::new(&config);

        Self {
            config,
            transport,
            roster,
            directory: PeerDirectory::new(),
            cache,
            store: ConversationStore::new(),
            active: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn cache(&self) -> &SharedSecretCache {
        &self.cache
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Username of the active session, if any.
    pub async fn username(&self) -> Option<String> {
        self.active_session()
            .await
            .map(|active| active.session.username().to_string())
    }

    /// Snapshot of the conversation with `peer`.
    pub async fn conversation(&self, peer: &str) -> Vec<ConversationEntry> {
        self.store.conversation(peer).await
    }

    /// Installs `session`, announces it on the transport and loads the peer set.
    ///
    /// Any previous session is torn down first. On failure the new session is
    /// torn down as well.
    pub async fn start_session(&self, session: Session) -> Result<(), Error> {
        let username = session.username().to_string();
        {
            let mut active = self.active.write().await;
            let (epoch, generation) = self.teardown(&mut active).await;
            *active = Some(Arc::new(ActiveSession {
                session,
                epoch,
                generation,
            }));
        }

        if let Err(err) = self.announce(&username).await {
            self.end_session().await;
            return Err(err);
        }

        tracing::info!(user = %username, "messaging session started");
        Ok(())
    }

    async fn announce(&self, username: &str) -> Result<(), Error> {
        self.transport
            .publish(&self.config.join_destination, &ChatEvent::join(username))
            .await?;

        if self.config.refresh_on_session_start {
            self.refresh_directory().await?;
        }

        Ok(())
    }

    /// Drops the session key pair, every derived secret, the peer set and all
    /// conversation logs.
    ///
    /// Operations still in flight finish against the old epoch and their
    /// results are discarded.
    pub async fn end_session(&self) {
        let mut active = self.active.write().await;
        self.teardown(&mut active).await;
    }

    /// Clears all session state while the caller holds the session slot for
    /// writing. Returns the new store epoch and cache generation.
    async fn teardown(&self, active: &mut Option<Arc<ActiveSession>>) -> (u64, u64) {
        let previous = active.take();

        let generation = self.cache.clear().await;
        self.directory.clear().await;
        let epoch = self.store.clear().await;

        if let Some(previous) = previous {
            tracing::info!(user = %previous.session.username(), "messaging session ended");
        }

        (epoch, generation)
    }

    /// Reloads the peer set and invalidates secrets of peers whose key changed.
    pub async fn refresh_directory(&self) -> Result<DirectorySnapshot, Error> {
        let snapshot = self.directory.refresh(&self.roster).await?;

        for peer in &snapshot.rekeyed {
            self.cache.invalidate(peer).await;
        }

        tracing::debug!(
            peers = snapshot.peers.len(),
            rekeyed = snapshot.rekeyed.len(),
            "peer directory refreshed"
        );
        Ok(snapshot)
    }

    /// Whether a message to `peer` could be encrypted right now.
    pub async fn is_securable(&self, peer: &str) -> bool {
        self.directory
            .lookup(peer)
            .await
            .is_some_and(|record| record.public_key.is_some())
    }

    /// Encrypts `plaintext` for `recipient` and publishes it.
    ///
    /// Returns the entry appended to the local log, which holds the original
    /// plaintext. Fails without publishing anything when no secret can be
    /// obtained for the recipient; there is no unencrypted fallback.
    pub async fn send(&self, plaintext: &str, recipient: &str) -> Result<ConversationEntry, Error> {
        let active = self.active_session().await.ok_or(Error::NoSession)?;
        let sender = active.session.username();

        let secret = self
            .cache
            .get_or_derive(
                active.generation,
                active.session.key_pair(),
                &self.directory,
                recipient,
            )
            .await
            .inspect_err(|err| {
                tracing::warn!(peer = recipient, error = %err, "cannot secure conversation");
            })?;

        let envelope = encrypt(&secret, plaintext.as_bytes())?;
        let timestamp = Utc::now();
        let event = ChatEvent::chat(sender, recipient, envelope.encode(), timestamp);

        // Held until the entry is stored, so a logout cannot slip in between
        // the check and the publish.
        let current = self.active.read().await;
        if !is_current(&current, &active) {
            tracing::debug!(peer = recipient, "session ended before message was sent");
            return Err(Error::NoSession);
        }

        self.transport
            .publish(&self.config.send_destination, &event)
            .await?;
        tracing::debug!(peer = recipient, "message sent");

        let entry = ConversationEntry::new(
            sender,
            recipient,
            EntryContent::Plaintext(plaintext.to_string()),
            timestamp,
            Direction::Own,
        );

        self.store
            .append(active.epoch, recipient, entry)
            .await
            .ok_or(Error::NoSession)
    }

    /// Entry point for raw transport deliveries.
    ///
    /// Never fails: undecodable deliveries are logged and dropped, and chat
    /// messages that cannot be decrypted become undecryptable entries.
    pub async fn on_inbound_envelope(&self, raw: &str) {
        match ChatEvent::from_json(raw) {
            Ok(event) => self.on_event(event).await,
            Err(err) => tracing::warn!(error = %err, "dropping undecodable transport event"),
        }
    }

    /// Dispatches one decoded transport event.
    pub async fn on_event(&self, event: ChatEvent) {
        let Some(active) = self.active_session().await else {
            tracing::debug!(kind = ?event.kind, "ignoring event without an active session");
            return;
        };

        match event.kind {
            EventKind::Join | EventKind::Leave => {
                tracing::debug!(peer = %event.sender, kind = ?event.kind, "presence changed");
                if let Err(err) = self.refresh_directory().await {
                    tracing::warn!(error = %err, "peer directory refresh failed");
                }
            }
            EventKind::Typing => {
                tracing::trace!(peer = %event.sender, "typing notification");
            }
            EventKind::Chat => self.receive_chat(active, event).await,
        }
    }

    async fn receive_chat(&self, active: Arc<ActiveSession>, event: ChatEvent) {
        let local = active.session.username();
        let Some(partner) = event.counterpart(local).map(str::to_string) else {
            tracing::warn!(sender = %event.sender, "chat event has no conversation partner");
            return;
        };

        let content = match self
            .open_envelope(&active, &partner, event.content.as_deref())
            .await
        {
            Ok(plaintext) => EntryContent::Plaintext(plaintext),
            Err(err) if err.is_decryption_failure() => {
                tracing::warn!(peer = %partner, error = %err, "message could not be decrypted");
                EntryContent::Undecryptable
            }
            Err(err) => {
                tracing::info!(peer = %partner, error = %err, "no usable key for message");
                EntryContent::Undecryptable
            }
        };

        let direction = if event.sender == local {
            Direction::Own
        } else {
            Direction::Received
        };
        let recipient = event.recipient.as_deref().unwrap_or(local);
        let timestamp = event.sent_at().unwrap_or_else(Utc::now);
        let entry =
            ConversationEntry::new(&event.sender, recipient, content, timestamp, direction);

        if self.store.append(active.epoch, &partner, entry).await.is_none() {
            tracing::debug!(peer = %partner, "session ended before message was stored");
        }
    }

    async fn open_envelope(
        &self,
        active: &Arc<ActiveSession>,
        partner: &str,
        content: Option<&str>,
    ) -> Result<String, Error> {
        let content =
            content.ok_or_else(|| Error::MalformedEnvelope("missing content".to_string()))?;
        let envelope = EncryptedEnvelope::decode(content)?;

        let secret = self.inbound_secret(active, partner).await?;
        let plaintext = decrypt(&secret, &envelope)?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Resolves the secret for an inbound message.
    ///
    /// A message can arrive from a peer that joined after the last refresh, so
    /// an unknown key triggers one refresh and one retry, as long as `active`
    /// is still the current session.
    async fn inbound_secret(
        &self,
        active: &Arc<ActiveSession>,
        partner: &str,
    ) -> Result<Arc<SharedSecret>, Error> {
        let key_pair = active.session.key_pair();

        match self
            .cache
            .get_or_derive(active.generation, key_pair, &self.directory, partner)
            .await
        {
            Err(Error::PeerKeyUnavailable(_)) => {
                if !is_current(&*self.active.read().await, active) {
                    return Err(Error::NoSession);
                }
                self.refresh_directory().await?;
                self.cache
                    .get_or_derive(active.generation, key_pair, &self.directory, partner)
                    .await
            }
            result => result,
        }
    }

    async fn active_session(&self) -> Option<Arc<ActiveSession>> {
        self.active.read().await.clone()
    }
}

fn is_current(current: &Option<Arc<ActiveSession>>, active: &Arc<ActiveSession>) -> bool {
    current
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(current, active))
}
