//! Core models for keeprs.
//!
//! An in-memory credential tree: groups holding entries and sub-groups,
//! owned by a database that records tombstones and custom icons. Secret
//! material lives in buffers that are wiped before their memory is
//! released. Entries can be searched with a small query language.

pub mod config;
pub mod database;
pub mod entry;
pub mod error;
pub mod events;
pub mod group;
pub mod models;
pub mod search;
pub mod secret;
pub mod secure_alloc;

pub use config::Config;
pub use database::Database;
pub use entry::Entry;
pub use error::{VaultError, VaultResult};
pub use events::{SubscriptionId, TreeEvent};
pub use group::Group;
pub use models::{
    DeletedObject, EntryCloneFlags, GroupCloneFlags, Icon, MergeMode, TimeInfo, TriState,
};
pub use search::{Field, SearchEngine, SearchTerm};
pub use secret::{SecretString, SecureBuffer};
pub use secure_alloc::{AllocPath, SecureAllocator};
