//! Append-only session log: per-session `.jsonl` event streams plus a
//! `.index.json` metadata sidecar (spec §4.1, §6).

mod store;
mod types;

pub use store::SessionLog;
pub use types::{
    CleanupOptions, LoadedSession, SessionEvent, SessionIndex, SessionMetadata, SessionStatus,
};
