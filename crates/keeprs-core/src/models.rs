//! Shared data types for the credential tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Built-in icon used for new groups.
pub const DEFAULT_GROUP_ICON: u32 = 48;
/// Built-in icon used for the recycle bin.
pub const RECYCLE_BIN_ICON: u32 = 43;
/// Built-in icon used for new entries.
pub const DEFAULT_ENTRY_ICON: u32 = 0;

/// Current time in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Policy flag that either sets a value or defers to the parent group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriState {
    #[default]
    Inherit,
    Enable,
    Disable,
}

/// How conflicting copies are reconciled by a later merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergeMode {
    /// Use the parent's mode.
    #[default]
    Default,
    Duplicate,
    KeepLocal,
    KeepRemote,
    KeepNewer,
    Synchronize,
}

/// Icon of a group or entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Icon {
    /// Index into the built-in icon set.
    Builtin(u32),
    /// Custom icon stored in the database under this uuid.
    Custom(Uuid),
}

impl Icon {
    pub fn custom_uuid(&self) -> Option<Uuid> {
        match self {
            Icon::Custom(uuid) => Some(*uuid),
            Icon::Builtin(_) => None,
        }
    }
}

/// Timestamps tracked for every group and entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    pub creation_time: DateTime<Utc>,
    pub last_modification_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
    pub location_changed: DateTime<Utc>,
    pub expires: bool,
    pub expiry_time: DateTime<Utc>,
}

impl TimeInfo {
    /// All timestamps set to the current time, not expiring.
    pub fn new() -> Self {
        let now = now();
        Self {
            creation_time: now,
            last_modification_time: now,
            last_access_time: now,
            location_changed: now,
            expires: false,
            expiry_time: now,
        }
    }

    /// Reset creation, modification, access and location times to `at`.
    pub fn reset(&mut self, at: DateTime<Utc>) {
        self.creation_time = at;
        self.last_modification_time = at;
        self.last_access_time = at;
        self.location_changed = at;
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_modification_time = at;
        self.last_access_time = at;
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expires && self.expiry_time < at
    }
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Record of a removed group or entry, kept for later reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedObject {
    pub uuid: Uuid,
    pub deletion_time: DateTime<Utc>,
}

/// Switches for deep-copying an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryCloneFlags {
    /// Give the copy a fresh uuid.
    pub new_uuid: bool,
    /// Set every timestamp of the copy to now.
    pub reset_time_info: bool,
    /// Copy the history snapshots as well.
    pub include_history: bool,
}

impl EntryCloneFlags {
    /// Keep uuid and timestamps, drop history.
    pub const NONE: Self = Self {
        new_uuid: false,
        reset_time_info: false,
        include_history: false,
    };
}

impl Default for EntryCloneFlags {
    fn default() -> Self {
        Self {
            new_uuid: true,
            reset_time_info: true,
            include_history: false,
        }
    }
}

/// Switches for deep-copying a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCloneFlags {
    /// Give the copy (and every copied child group) a fresh uuid.
    pub new_uuid: bool,
    /// Copy entries and child groups; otherwise the copy is an empty shell.
    pub include_entries: bool,
    /// Set every timestamp of the copy to now.
    pub reset_time_info: bool,
}

impl GroupCloneFlags {
    pub const NONE: Self = Self {
        new_uuid: false,
        include_entries: false,
        reset_time_info: false,
    };
}

impl Default for GroupCloneFlags {
    fn default() -> Self {
        Self {
            new_uuid: true,
            include_entries: true,
            reset_time_info: true,
        }
    }
}

/// Escape a title for use as the last segment of an entry path.
pub fn escape_path_segment(title: &str) -> String {
    title.replace('/', "\\/")
}

/// Split an entry path at every `/` that is not escaped as `\/`.
///
/// The escape sequences in the returned segments are undone.
pub fn split_entry_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'/') => {
                chars.next();
                current.push('/');
            }
            '/' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}
