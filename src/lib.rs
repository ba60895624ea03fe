mod types;
pub use types::*;

mod error;
pub use error::Error;

mod config;
pub use config::EngineConfig;

mod key_pair;
pub use key_pair::KeyPair;

mod shared_secret;
pub use shared_secret::*;

mod cipher;
pub use cipher::*;

mod directory;
pub use directory::*;

mod conversation;
pub use conversation::*;

mod event;
pub use event::*;

mod transport;
pub use transport::*;

mod session;
pub use session::*;

mod pipeline;
pub use pipeline::MessagePipeline;
