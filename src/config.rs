/// Tunables for the messaging engine.
///
/// Both parties of a conversation must agree on `kdf_salt` and `kdf_info`,
/// otherwise their derived keys differ and every message renders as
/// undecryptable.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// HKDF salt applied to the raw ECDH output.
    pub kdf_salt: Vec<u8>,
    /// HKDF info string binding derived keys to this protocol.
    pub kdf_info: Vec<u8>,
    /// Transport destination for outbound `CHAT` events.
    pub send_destination: String,
    /// Transport destination for the `JOIN` announcement at session start.
    pub join_destination: String,
    /// Display text for entries that could not be decrypted.
    pub undecryptable_placeholder: String,
    /// Refresh the peer directory as part of starting a session.
    pub refresh_on_session_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kdf_salt: b"Sealchat-E2E-Salt".to_vec(),
            kdf_info: b"Sealchat-E2E-P521-AES256GCMSIV".to_vec(),
            send_destination: "/app/chat.sendPrivateMessage".to_string(),
            join_destination: "/app/chat.addUser".to_string(),
            undecryptable_placeholder: "[Encrypted Message - Key Mismatch]".to_string(),
            refresh_on_session_start: true,
        }
    }
}
