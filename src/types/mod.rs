mod p521_key;
pub use p521_key::*;
