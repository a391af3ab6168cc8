//! Fileshare Daemon - Configuration store and share synchronization
//!
//! This crate provides:
//! - `ShareStore`, the concurrency-safe holder of users and shares
//! - `SyncEngine`, which keeps the per-user symlink mirror consistent
//!   with the declared shares
//! - `ShareFs`, the filesystem capability the engine works through
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Request handlers / CLI                      │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ get_user / add_share / ...
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                ShareStore (RwLock)                          │
//! │  - users, shares, settings                                  │
//! │  - name / IP index, rebuilt on every write                  │
//! │  - config.json written when a write section ends            │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ while holding the write lock
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                SyncEngine over ShareFs                      │
//! │  {files_path}/{consumer}/shares/{owner}/{name}_{hash}       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod fs;
pub mod index;
pub mod memfs;
pub mod store;
pub mod sync_engine;

pub use fs::{OsFs, ShareFs};
pub use index::{normalize_ip, UserIndex};
pub use memfs::MemoryFs;
pub use store::ShareStore;
pub use sync_engine::{Reconciled, SyncEngine, SyncError, SyncReport};
