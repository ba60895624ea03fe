use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Whether an entry was composed locally or received from the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Own,
    Received,
}

/// Body of a conversation entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryContent {
    /// Locally composed text or a successfully decrypted message.
    Plaintext(String),
    /// A received message that failed to decrypt. Kept so the log shows it
    /// instead of silently skipping it.
    Undecryptable,
}

/// One message in a peer's conversation log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationEntry {
    pub sender: String,
    pub recipient: String,
    pub content: EntryContent,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Position in the peer's log, assigned when the entry is appended.
    pub sequence: u64,
}

impl ConversationEntry {
    pub(crate) fn new(
        sender: &str,
        recipient: &str,
        content: EntryContent,
        timestamp: DateTime<Utc>,
        direction: Direction,
    ) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content,
            timestamp,
            direction,
            sequence: 0,
        }
    }

    pub fn is_own(&self) -> bool {
        self.direction == Direction::Own
    }

    pub fn is_undecryptable(&self) -> bool {
        self.content == EntryContent::Undecryptable
    }

    /// Plaintext body, or `None` for an undecryptable entry.
    pub fn plaintext(&self) -> Option<&str> {
        match &self.content {
            EntryContent::Plaintext(text) => Some(text),
            EntryContent::Undecryptable => None,
        }
    }

    /// Text to render, substituting `placeholder` for undecryptable entries.
    pub fn display_text<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.plaintext().unwrap_or(placeholder)
    }
}

struct StoreState {
    epoch: u64,
    logs: HashMap<String, Vec<ConversationEntry>>,
}

/// Append-only, per-peer message logs for the current session.
///
/// Every clear starts a new epoch. Appends tagged with an older epoch are
/// dropped, so work that outlives its session never reaches the new logs.
pub struct ConversationStore {
    state: RwLock<StoreState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                epoch: 0,
                logs: HashMap::new(),
            }),
        }
    }

    /// Current epoch.
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// Appends `entry` to the log for `peer`, assigning its sequence number.
    ///
    /// Returns `None` without touching the logs when `epoch` is stale.
    pub(crate) async fn append(
        &self,
        epoch: u64,
        peer: &str,
        mut entry: ConversationEntry,
    ) -> Option<ConversationEntry> {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return None;
        }

        let log = state.logs.entry(peer.to_string()).or_default();
        entry.sequence = log.len() as u64;
        log.push(entry.clone());

        Some(entry)
    }

    /// Snapshot of the log for `peer`, in insertion order.
    pub async fn conversation(&self, peer: &str) -> Vec<ConversationEntry> {
        self.state
            .read()
            .await
            .logs
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }

    /// Peers with at least one entry, sorted by username.
    pub async fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.state.read().await.logs.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Drops every log and starts a new epoch, which is returned.
    pub async fn clear(&self) -> u64 {
        let mut state = self.state.write().await;
        state.logs.clear();
        state.epoch = state.epoch.wrapping_add(1);
        state.epoch
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
