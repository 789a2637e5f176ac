pub mod key;
mod memory;
pub mod refresh_token;

pub use key::{KeyRing, SigningKey};
pub use memory::MemoryRefreshStore;
pub use refresh_token::{RefreshStore, RefreshToken};
