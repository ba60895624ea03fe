#[macro_use]
extern crate afl;
use sealchat::EncryptedEnvelope;

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = EncryptedEnvelope::from_bytes(data);
        if let Ok(text) = std::str::from_utf8(data) {
            let _ = EncryptedEnvelope::decode(text);
        }
    });
}
