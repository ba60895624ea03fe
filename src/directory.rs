use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Online,
    #[default]
    Offline,
}

/// A known peer as published by the roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub username: String,
    /// Public key as a JWK string. Absent until the peer has logged in with
    /// a key-publishing client.
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub status: PresenceStatus,
}

/// The peer-roster collaborator.
///
/// Each call returns an authoritative full listing of users.
pub trait Roster {
    fn list_users(&self) -> impl Future<Output = Result<Vec<PeerRecord>, Error>> + Send;
}

/// Result of a directory refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    /// The new peer set, sorted by username.
    pub peers: Vec<PeerRecord>,
    /// Peers whose previously known key changed or disappeared.
    pub rekeyed: Vec<String>,
    /// The listing was discarded because a newer refresh or a clear won.
    /// `peers` then holds the set that is actually current.
    pub superseded: bool,
}

#[derive(Default)]
struct DirectoryState {
    peers: HashMap<String, PeerRecord>,
    /// Ticket of the last listing applied, or of the last clear.
    applied: u64,
}

/// Known peers and their published public keys.
///
/// Every refresh replaces the whole set; there is no merging. Each refresh
/// draws a ticket before asking the roster, and a listing is only applied if
/// no later ticket has been applied or cleared in the meantime.
#[derive(Default)]
pub struct PeerDirectory {
    state: RwLock<DirectoryState>,
    issued: AtomicU64,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulls a full listing from `roster` and replaces the known set with it.
    pub async fn refresh<R: Roster>(&self, roster: &R) -> Result<DirectorySnapshot, Error> {
        let ticket = self.next_ticket();
        let records = roster.list_users().await?;
        Ok(self.apply(ticket, records).await)
    }

    /// Replaces the known set with `records`.
    ///
    /// Later duplicates of a username win.
    pub async fn replace(&self, records: Vec<PeerRecord>) -> DirectorySnapshot {
        let ticket = self.next_ticket();
        self.apply(ticket, records).await
    }

    /// Returns the record for `username`, if known.
    pub async fn lookup(&self, username: &str) -> Option<PeerRecord> {
        self.state.read().await.peers.get(username).cloned()
    }

    /// All known peers, sorted by username.
    pub async fn peers(&self) -> Vec<PeerRecord> {
        sorted(&self.state.read().await.peers)
    }

    /// Forgets every peer. Refreshes already waiting on the roster are
    /// discarded when they complete.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.peers.clear();
        state.applied = self.issued.load(Ordering::SeqCst);
    }

    fn next_ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply(&self, ticket: u64, records: Vec<PeerRecord>) -> DirectorySnapshot {
        let mut state = self.state.write().await;

        if ticket <= state.applied {
            tracing::debug!(ticket, applied = state.applied, "discarding stale roster listing");
            return DirectorySnapshot {
                peers: sorted(&state.peers),
                rekeyed: Vec::new(),
                superseded: true,
            };
        }

        let incoming: HashMap<String, PeerRecord> = records
            .into_iter()
            .map(|record| (record.username.clone(), record))
            .collect();

        let mut rekeyed: Vec<String> = state
            .peers
            .values()
            .filter(|old| old.public_key.is_some())
            .filter(|old| {
                incoming
                    .get(&old.username)
                    .and_then(|new| new.public_key.as_ref())
                    != old.public_key.as_ref()
            })
            .map(|old| old.username.clone())
            .collect();
        rekeyed.sort();

        state.peers = incoming;
        state.applied = ticket;

        DirectorySnapshot {
            peers: sorted(&state.peers),
            rekeyed,
            superseded: false,
        }
    }
}

fn sorted(peers: &HashMap<String, PeerRecord>) -> Vec<PeerRecord> {
    let mut listing: Vec<PeerRecord> = peers.values().cloned().collect();
    listing.sort_by(|a, b| a.username.cmp(&b.username));
    listing
}
