//! Groups: the nodes of the credential tree.
//!
//! A group owns its child groups and entries. Children keep a weak link back
//! to their parent and to the database the tree is attached to, used for
//! lookups and inherited settings only.

mod clone;
mod lookup;
mod tree;

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::{Database, DatabaseNode};
use crate::entry::{Entry, EntryNode};
use crate::events::{Observers, SubscriptionId, TreeEvent};
use crate::models::{now, Icon, MergeMode, TimeInfo, TriState, DEFAULT_GROUP_ICON, RECYCLE_BIN_ICON};

/// Auto-type sequence used when no group on the way to the root sets one.
pub const ROOT_AUTO_TYPE_SEQUENCE: &str = "{USERNAME}{TAB}{PASSWORD}{ENTER}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupData {
    name: String,
    notes: String,
    icon: Icon,
    time_info: TimeInfo,
    is_expanded: bool,
    default_auto_type_sequence: String,
    auto_type_enabled: TriState,
    searching_enabled: TriState,
    merge_mode: MergeMode,
}

impl Default for GroupData {
    fn default() -> Self {
        Self {
            name: String::new(),
            notes: String::new(),
            icon: Icon::Builtin(DEFAULT_GROUP_ICON),
            time_info: TimeInfo::new(),
            is_expanded: true,
            default_auto_type_sequence: String::new(),
            auto_type_enabled: TriState::Inherit,
            searching_enabled: TriState::Inherit,
            merge_mode: MergeMode::Default,
        }
    }
}

pub(crate) struct GroupNode {
    uuid: Cell<Uuid>,
    data: RefCell<GroupData>,
    custom_data: RefCell<BTreeMap<String, String>>,
    children: RefCell<Vec<Group>>,
    entries: RefCell<Vec<Entry>>,
    last_top_visible_entry: RefCell<Weak<EntryNode>>,
    parent: RefCell<Weak<GroupNode>>,
    database: RefCell<Weak<DatabaseNode>>,
    observers: Observers,
    update_time_info: Cell<bool>,
}

/// A named container of entries and child groups.
///
/// `Group` is a handle: cloning it refers to the same node. Use
/// [`Group::clone_with`] for a deep copy of the subtree.
#[derive(Clone)]
pub struct Group(pub(crate) Rc<GroupNode>);

impl Group {
    /// Create a detached, empty group with a fresh uuid.
    pub fn new() -> Self {
        Self::with_uuid(Uuid::new_v4())
    }

    pub fn with_uuid(uuid: Uuid) -> Self {
        assert!(!uuid.is_nil(), "group uuid must not be nil");
        Self(Rc::new(GroupNode {
            uuid: Cell::new(uuid),
            data: RefCell::new(GroupData::default()),
            custom_data: RefCell::new(BTreeMap::new()),
            children: RefCell::new(Vec::new()),
            entries: RefCell::new(Vec::new()),
            last_top_visible_entry: RefCell::new(Weak::new()),
            parent: RefCell::new(Weak::new()),
            database: RefCell::new(Weak::new()),
            observers: Observers::default(),
            update_time_info: Cell::new(true),
        }))
    }

    /// Create the group deleted items are moved into.
    pub fn create_recycle_bin() -> Self {
        let bin = Self::new();
        bin.set_name("Recycle Bin");
        bin.set_icon(Icon::Builtin(RECYCLE_BIN_ICON));
        bin.set_searching_enabled(TriState::Disable);
        bin.set_auto_type_enabled(TriState::Disable);
        bin
    }

    pub(crate) fn downgrade(&self) -> Weak<GroupNode> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(node: &Weak<GroupNode>) -> Option<Self> {
        node.upgrade().map(Self)
    }

    pub fn uuid(&self) -> Uuid {
        self.0.uuid.get()
    }

    /// Uuid as 32 lowercase hex digits.
    pub fn uuid_to_hex(&self) -> String {
        self.uuid().simple().to_string()
    }

    /// Panics on the nil uuid or one already used in the group's tree.
    pub fn set_uuid(&self, uuid: Uuid) {
        assert!(!uuid.is_nil(), "group uuid must not be nil");
        if self.uuid() != uuid {
            self.assert_uuids_unused([uuid]);
            self.0.uuid.set(uuid);
            self.modified();
        }
    }

    fn data(&self) -> Ref<'_, GroupData> {
        self.0.data.borrow()
    }

    fn update<T: PartialEq>(&self, value: T, field: impl FnOnce(&mut GroupData) -> &mut T) -> bool {
        {
            let mut data = self.0.data.borrow_mut();
            let slot = field(&mut data);
            if *slot == value {
                return false;
            }
            *slot = value;
        }
        self.modified();
        true
    }

    pub fn name(&self) -> String {
        self.data().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        if self.update(name.into(), |d| &mut d.name) {
            self.emit(TreeEvent::GroupDataChanged { group: self.uuid() });
        }
    }

    pub fn notes(&self) -> String {
        self.data().notes.clone()
    }

    pub fn set_notes(&self, notes: impl Into<String>) {
        self.update(notes.into(), |d| &mut d.notes);
    }

    pub fn icon(&self) -> Icon {
        self.data().icon
    }

    pub fn set_icon(&self, icon: Icon) {
        if let Icon::Custom(uuid) = icon {
            assert!(!uuid.is_nil(), "custom icon uuid must not be nil");
        }
        if self.update(icon, |d| &mut d.icon) {
            self.emit(TreeEvent::GroupDataChanged { group: self.uuid() });
        }
    }

    pub fn time_info(&self) -> TimeInfo {
        self.data().time_info.clone()
    }

    /// Replace the time info without raising a modification.
    pub fn set_time_info(&self, time_info: TimeInfo) {
        self.0.data.borrow_mut().time_info = time_info;
    }

    pub fn set_expires(&self, expires: bool) {
        self.update(expires, |d| &mut d.time_info.expires);
    }

    pub fn set_expiry_time(&self, at: DateTime<Utc>) {
        self.update(at, |d| &mut d.time_info.expiry_time);
    }

    pub fn is_expired(&self) -> bool {
        self.data().time_info.is_expired(now())
    }

    pub fn is_expanded(&self) -> bool {
        self.data().is_expanded
    }

    /// Expanding is UI state; with `ignore_group_expansion` configured it
    /// only refreshes the timestamps.
    pub fn set_expanded(&self, expanded: bool) {
        if self.is_expanded() == expanded {
            return;
        }
        let ignore = self
            .database()
            .is_some_and(|db| db.config().ignore_group_expansion);
        if ignore {
            let mut data = self.0.data.borrow_mut();
            data.is_expanded = expanded;
            if self.can_update_time_info() {
                data.time_info.touch(now());
            }
            return;
        }
        self.update(expanded, |d| &mut d.is_expanded);
    }

    pub fn default_auto_type_sequence(&self) -> String {
        self.data().default_auto_type_sequence.clone()
    }

    pub fn set_default_auto_type_sequence(&self, sequence: impl Into<String>) {
        self.update(sequence.into(), |d| &mut d.default_auto_type_sequence);
    }

    pub fn auto_type_enabled(&self) -> TriState {
        self.data().auto_type_enabled
    }

    pub fn set_auto_type_enabled(&self, value: TriState) {
        self.update(value, |d| &mut d.auto_type_enabled);
    }

    pub fn searching_enabled(&self) -> TriState {
        self.data().searching_enabled
    }

    pub fn set_searching_enabled(&self, value: TriState) {
        self.update(value, |d| &mut d.searching_enabled);
    }

    /// Merge mode with `Default` resolved through the ancestors.
    pub fn merge_mode(&self) -> MergeMode {
        let mode = self.data().merge_mode;
        if mode != MergeMode::Default {
            return mode;
        }
        match self.parent_group() {
            Some(parent) => parent.merge_mode(),
            None => MergeMode::KeepNewer,
        }
    }

    pub fn set_merge_mode(&self, mode: MergeMode) {
        self.update(mode, |d| &mut d.merge_mode);
    }

    pub fn custom_data(&self) -> BTreeMap<String, String> {
        self.0.custom_data.borrow().clone()
    }

    pub fn set_custom_data(&self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let changed = self
            .0
            .custom_data
            .borrow_mut()
            .insert(key.into(), value.clone())
            != Some(value);
        if changed {
            self.modified();
        }
    }

    pub fn remove_custom_data(&self, key: &str) -> bool {
        let removed = self.0.custom_data.borrow_mut().remove(key).is_some();
        if removed {
            self.modified();
        }
        removed
    }

    pub fn last_top_visible_entry(&self) -> Option<Entry> {
        Entry::upgrade(&self.0.last_top_visible_entry.borrow())
    }

    pub fn set_last_top_visible_entry(&self, entry: Option<&Entry>) {
        let current = self.last_top_visible_entry();
        if current.as_ref() == entry {
            return;
        }
        *self.0.last_top_visible_entry.borrow_mut() = entry.map(Entry::downgrade).unwrap_or_default();
        self.modified();
    }

    pub fn parent_group(&self) -> Option<Group> {
        Group::upgrade(&self.0.parent.borrow())
    }

    pub fn database(&self) -> Option<Database> {
        Database::upgrade(&self.0.database.borrow())
    }

    /// Direct child groups, in order.
    pub fn children(&self) -> Vec<Group> {
        self.0.children.borrow().clone()
    }

    /// Entries directly owned by this group, in order.
    pub fn entries(&self) -> Vec<Entry> {
        self.0.entries.borrow().clone()
    }

    pub fn can_update_time_info(&self) -> bool {
        self.0.update_time_info.get()
    }

    pub fn set_update_time_info(&self, value: bool) {
        self.0.update_time_info.set(value);
    }

    /// Auto-type enabled state, walking up through `Inherit`.
    pub fn resolve_auto_type_enabled(&self) -> bool {
        self.resolve_flag(Group::auto_type_enabled)
    }

    /// Searching enabled state, walking up through `Inherit`.
    pub fn resolve_searching_enabled(&self) -> bool {
        self.resolve_flag(Group::searching_enabled)
    }

    fn resolve_flag(&self, flag: fn(&Group) -> TriState) -> bool {
        let mut group = Some(self.clone());
        while let Some(current) = group {
            match flag(&current) {
                TriState::Enable => return true,
                TriState::Disable => return false,
                TriState::Inherit => group = current.parent_group(),
            }
        }
        true
    }

    /// Sequence auto-type would inject for entries of this group.
    ///
    /// Empty as soon as this group or an ancestor disables auto-type;
    /// otherwise the nearest non-empty sequence, or [`ROOT_AUTO_TYPE_SEQUENCE`].
    pub fn effective_auto_type_sequence(&self) -> String {
        let mut sequence = String::new();
        let mut group = Some(self.clone());

        while let Some(current) = group {
            if current.auto_type_enabled() == TriState::Disable {
                return String::new();
            }
            if sequence.is_empty() {
                sequence = current.default_auto_type_sequence();
            }
            group = current.parent_group();
        }

        if sequence.is_empty() {
            sequence = ROOT_AUTO_TYPE_SEQUENCE.to_string();
        }
        sequence
    }

    /// Register a handler for changes raised by this group.
    pub fn subscribe(&self, handler: impl Fn(&TreeEvent) + 'static) -> SubscriptionId {
        self.0.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.0.observers.unsubscribe(id)
    }

    /// Deliver `event` to this group's handlers, then to its database.
    pub(crate) fn emit(&self, event: TreeEvent) {
        self.0.observers.notify(&event);
        if let Some(db) = self.database() {
            db.notify(&event);
        }
    }

    /// Data change: refresh the timestamps, then raise `Modified`.
    pub(crate) fn modified(&self) {
        if self.can_update_time_info() {
            self.0.data.borrow_mut().time_info.touch(now());
        }
        self.emit_modified();
    }

    /// Raise `Modified` without touching the timestamps. Used for structural
    /// changes, which only maintain the location-changed time.
    pub(crate) fn emit_modified(&self) {
        self.emit(TreeEvent::Modified { group: self.uuid() });
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Group {}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("uuid", &self.uuid())
            .field("name", &self.data().name)
            .field("children", &self.0.children.borrow().len())
            .field("entries", &self.0.entries.borrow().len())
            .finish()
    }
}
