//! Voice preset management.
//!
//! The [`PresetRegistry`] holds every preset known to the process and is
//! frozen after boot. The [`PresetIdStore`] records which preset a guild or
//! user picked. The [`PresetResolver`] combines the two into a single
//! user → guild → fallback lookup.

pub mod error;
pub mod registry;
pub mod resolver;
pub mod store;

pub use error::{PresetError, StoreError};
pub use registry::PresetRegistry;
pub use resolver::PresetResolver;
pub use store::{MemoryPresetIdStore, PresetIdStore, SqlitePresetIdStore};
