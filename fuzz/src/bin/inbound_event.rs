#[macro_use]
extern crate afl;
use sealchat::{
    AuthenticatedUser, ChannelTransport, Error, KeyPair, MessagePipeline, PeerRecord,
    PresenceStatus, Roster, Session,
};

struct FixedRoster(Vec<PeerRecord>);

impl Roster for FixedRoster {
    async fn list_users(&self) -> Result<Vec<PeerRecord>, Error> {
        Ok(self.0.clone())
    }
}

fn main() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Runtime builds");

    // The victim, with one attacker-controlled peer in its directory.
    let attacker = KeyPair::generate().expect("Setup failed");
    let roster = FixedRoster(vec![PeerRecord {
        username: "mallory".to_string(),
        public_key: Some(attacker.export_public()),
        status: PresenceStatus::Online,
    }]);
    let (transport, _outbound) = ChannelTransport::new();
    let pipeline = MessagePipeline::new(transport, roster, None);

    let session = Session::new(
        AuthenticatedUser {
            username: "victim".to_string(),
            email: None,
        },
        KeyPair::generate().expect("Setup failed"),
    );
    runtime
        .block_on(pipeline.start_session(session))
        .expect("Setup failed");

    fuzz!(|data: &[u8]| {
        if let Ok(raw) = std::str::from_utf8(data) {
            runtime.block_on(pipeline.on_inbound_envelope(raw));
        }
    });
}
