//! Credential entries.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::database::Database;
use crate::events::TreeEvent;
use crate::group::{Group, GroupNode};
use crate::models::{escape_path_segment, now, EntryCloneFlags, Icon, TimeInfo, DEFAULT_ENTRY_ICON};
use crate::secret::{SecretString, SecureBuffer};

/// Names of the standard fields, as used by attribute lookups.
pub const TITLE: &str = "Title";
pub const USERNAME: &str = "UserName";
pub const PASSWORD: &str = "Password";
pub const URL: &str = "URL";
pub const NOTES: &str = "Notes";

/// Standard fields in display order.
pub const DEFAULT_ATTRIBUTES: [&str; 5] = [TITLE, USERNAME, PASSWORD, URL, NOTES];

/// Maximum nesting of placeholder references that is expanded.
const MAX_PLACEHOLDER_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntryData {
    title: String,
    username: String,
    password: SecretString,
    url: String,
    notes: String,
    attributes: BTreeMap<String, String>,
    attachments: BTreeMap<String, SecureBuffer>,
    icon: Icon,
    time_info: TimeInfo,
}

impl Default for EntryData {
    fn default() -> Self {
        Self {
            title: String::new(),
            username: String::new(),
            password: SecretString::new(),
            url: String::new(),
            notes: String::new(),
            attributes: BTreeMap::new(),
            attachments: BTreeMap::new(),
            icon: Icon::Builtin(DEFAULT_ENTRY_ICON),
            time_info: TimeInfo::new(),
        }
    }
}

pub(crate) struct EntryNode {
    uuid: Cell<Uuid>,
    data: RefCell<EntryData>,
    history: RefCell<Vec<Entry>>,
    group: RefCell<Weak<GroupNode>>,
    update_time_info: Cell<bool>,
}

/// A single credential record.
///
/// `Entry` is a handle: cloning it refers to the same record. Use
/// [`Entry::clone_with`] for a deep copy.
#[derive(Clone)]
pub struct Entry(pub(crate) Rc<EntryNode>);

impl Entry {
    /// Create a detached entry with a fresh uuid.
    pub fn new() -> Self {
        Self::with_uuid(Uuid::new_v4())
    }

    pub fn with_uuid(uuid: Uuid) -> Self {
        assert!(!uuid.is_nil(), "entry uuid must not be nil");
        Self(Rc::new(EntryNode {
            uuid: Cell::new(uuid),
            data: RefCell::new(EntryData::default()),
            history: RefCell::new(Vec::new()),
            group: RefCell::new(Weak::new()),
            update_time_info: Cell::new(true),
        }))
    }

    pub(crate) fn downgrade(&self) -> Weak<EntryNode> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(node: &Weak<EntryNode>) -> Option<Self> {
        node.upgrade().map(Self)
    }

    pub fn uuid(&self) -> Uuid {
        self.0.uuid.get()
    }

    /// Uuid as 32 lowercase hex digits.
    pub fn uuid_to_hex(&self) -> String {
        self.uuid().simple().to_string()
    }

    /// Panics on the nil uuid or one already used in the entry's tree.
    pub fn set_uuid(&self, uuid: Uuid) {
        assert!(!uuid.is_nil(), "entry uuid must not be nil");
        if self.uuid() != uuid {
            if let Some(group) = self.group() {
                group.assert_uuids_unused([uuid]);
            }
            self.0.uuid.set(uuid);
            self.modified();
        }
    }

    fn update<T: PartialEq>(&self, value: T, field: impl FnOnce(&mut EntryData) -> &mut T) -> bool {
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

    pub fn title(&self) -> String {
        self.0.data.borrow().title.clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.update(title.into(), |d| &mut d.title);
    }

    pub fn username(&self) -> String {
        self.0.data.borrow().username.clone()
    }

    pub fn set_username(&self, username: impl Into<String>) {
        self.update(username.into(), |d| &mut d.username);
    }

    pub fn password(&self) -> SecretString {
        self.0.data.borrow().password.clone()
    }

    pub fn set_password(&self, password: impl Into<SecretString>) {
        self.update(password.into(), |d| &mut d.password);
    }

    pub fn url(&self) -> String {
        self.0.data.borrow().url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.update(url.into(), |d| &mut d.url);
    }

    pub fn notes(&self) -> String {
        self.0.data.borrow().notes.clone()
    }

    pub fn set_notes(&self, notes: impl Into<String>) {
        self.update(notes.into(), |d| &mut d.notes);
    }

    pub fn icon(&self) -> Icon {
        self.0.data.borrow().icon
    }

    pub fn set_icon(&self, icon: Icon) {
        self.update(icon, |d| &mut d.icon);
    }

    pub fn time_info(&self) -> TimeInfo {
        self.0.data.borrow().time_info.clone()
    }

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
        self.0.data.borrow().time_info.is_expired(now())
    }

    /// Value of a standard field or custom attribute. The copy is wiped when
    /// dropped since it may hold the password.
    pub fn attribute(&self, name: &str) -> Option<Zeroizing<String>> {
        let data = self.0.data.borrow();
        let value = match name {
            TITLE => data.title.clone(),
            USERNAME => data.username.clone(),
            PASSWORD => data.password.as_str().to_owned(),
            URL => data.url.clone(),
            NOTES => data.notes.clone(),
            _ => data.attributes.get(name)?.clone(),
        };
        Some(Zeroizing::new(value))
    }

    pub fn custom_attribute_keys(&self) -> Vec<String> {
        self.0.data.borrow().attributes.keys().cloned().collect()
    }

    /// Set a custom attribute. Standard field names are a caller bug.
    pub fn set_custom_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        assert!(!key.is_empty(), "attribute key must not be empty");
        assert!(
            !DEFAULT_ATTRIBUTES.contains(&key.as_str()),
            "'{key}' is a standard field"
        );
        let value = value.into();
        let changed = {
            let mut data = self.0.data.borrow_mut();
            data.attributes.insert(key, value.clone()) != Some(value)
        };
        if changed {
            self.modified();
        }
    }

    pub fn remove_custom_attribute(&self, key: &str) -> bool {
        let removed = self.0.data.borrow_mut().attributes.remove(key).is_some();
        if removed {
            self.modified();
        }
        removed
    }

    pub fn attachment_names(&self) -> Vec<String> {
        self.0.data.borrow().attachments.keys().cloned().collect()
    }

    pub fn attachment(&self, name: &str) -> Option<SecureBuffer> {
        self.0.data.borrow().attachments.get(name).cloned()
    }

    pub fn set_attachment(&self, name: impl Into<String>, data: impl Into<SecureBuffer>) {
        let name = name.into();
        assert!(!name.is_empty(), "attachment name must not be empty");
        self.0.data.borrow_mut().attachments.insert(name, data.into());
        self.modified();
    }

    pub fn remove_attachment(&self, name: &str) -> bool {
        let removed = self.0.data.borrow_mut().attachments.remove(name).is_some();
        if removed {
            self.modified();
        }
        removed
    }

    pub fn group(&self) -> Option<Group> {
        Group::upgrade(&self.0.group.borrow())
    }

    pub(crate) fn set_group_link(&self, group: Option<&Group>) {
        *self.0.group.borrow_mut() = group.map(Group::downgrade).unwrap_or_default();
    }

    pub fn database(&self) -> Option<Database> {
        self.group().and_then(|g| g.database())
    }

    /// Path of the owning group followed by the escaped title.
    pub fn path(&self) -> Option<String> {
        let group = self.group()?;
        Some(format!("{}{}", group.path(), escape_path_segment(&self.title())))
    }

    pub fn can_update_time_info(&self) -> bool {
        self.0.update_time_info.get()
    }

    pub fn set_update_time_info(&self, value: bool) {
        self.0.update_time_info.set(value);
    }

    fn modified(&self) {
        if self.can_update_time_info() {
            self.0.data.borrow_mut().time_info.touch(now());
        }
        if let Some(group) = self.group() {
            group.emit(TreeEvent::EntryDataChanged {
                group: group.uuid(),
                entry: self.uuid(),
            });
        }
    }

    /// Move the entry into `group` at `index` (`None` appends).
    ///
    /// Leaving a database tombstones the entry there and copies its custom
    /// icon to the new database. Panics on an out-of-range index or when the
    /// entry's uuid is already used in the target tree.
    pub fn set_parent(&self, group: &Group, index: Option<usize>) {
        let previous = self.group();
        let same_group = previous.as_ref() == Some(group);

        // Checked before the entry is unlinked.
        let len = group.entries().len();
        let max_index = if same_group { len - 1 } else { len };
        if let Some(index) = index {
            assert!(index <= max_index, "entry index {index} out of range (0..={max_index})");
        }
        if same_group && (index.is_none() || index == group.entry_index(self)) {
            return;
        }
        let same_tree = previous
            .as_ref()
            .is_some_and(|p| p.tree_root() == group.tree_root());
        if !same_tree {
            group.assert_uuids_unused([self.uuid()]);
        }

        if let Some(previous) = &previous {
            let old_db = previous.database();
            previous.detach_entry(self);

            if let Some(old_db) = old_db {
                let new_db = group.database();
                if new_db.as_ref() != Some(&old_db) {
                    old_db.add_deleted_object(self.uuid(), now());
                    if let (Some(new_db), Some(icon)) = (new_db, self.icon().custom_uuid()) {
                        new_db.import_custom_icon(&old_db, icon);
                    }
                }
            }
        }

        group.insert_entry(self, index);

        if self.can_update_time_info() {
            self.0.data.borrow_mut().time_info.location_changed = now();
        }
    }

    /// Remove the entry from its group and discard its history.
    ///
    /// An entry inside a database leaves exactly one tombstone behind.
    pub fn destroy(&self) {
        if let Some(group) = self.group() {
            group.remove_entry(self);
        }
        self.0.history.borrow_mut().clear();
    }

    /// Deep copy. The copy is detached.
    pub fn clone_with(&self, flags: EntryCloneFlags) -> Entry {
        let uuid = if flags.new_uuid { Uuid::new_v4() } else { self.uuid() };
        let cloned = Entry::with_uuid(uuid);
        cloned.set_update_time_info(false);
        *cloned.0.data.borrow_mut() = self.0.data.borrow().clone();

        if flags.include_history {
            let history: Vec<Entry> = self
                .0
                .history
                .borrow()
                .iter()
                .map(|item| {
                    let copy = item.clone_with(EntryCloneFlags::NONE);
                    copy.0.uuid.set(uuid);
                    copy
                })
                .collect();
            *cloned.0.history.borrow_mut() = history;
        }

        if flags.reset_time_info {
            cloned.0.data.borrow_mut().time_info.reset(now());
        }
        cloned.set_update_time_info(true);
        cloned
    }

    /// Previous versions of this entry, oldest first.
    pub fn history_items(&self) -> Vec<Entry> {
        self.0.history.borrow().clone()
    }

    /// Append a snapshot to the history. It must be detached and history-free.
    pub fn add_history_item(&self, item: Entry) {
        assert!(item.group().is_none(), "history items cannot belong to a group");
        assert!(
            item.0.history.borrow().is_empty(),
            "history items cannot have history of their own"
        );
        self.0.history.borrow_mut().push(item);
    }

    /// Store a copy of the current state in the history, keeping at most
    /// the number of snapshots configured for the owning database.
    pub fn create_history_snapshot(&self) {
        let max_items = self
            .database()
            .map(|db| db.config().history_max_items)
            .unwrap_or_else(|| crate::config::Config::default().history_max_items);

        let snapshot = self.clone_with(EntryCloneFlags::NONE);
        let mut history = self.0.history.borrow_mut();
        history.push(snapshot);
        if history.len() > max_items {
            let excess = history.len() - max_items;
            history.drain(..excess);
        }
    }

    /// Expand `{TITLE}`, `{USERNAME}`, `{URL}`, `{PASSWORD}`, `{NOTES}` and
    /// `{S:name}` references in `value`.
    ///
    /// The result may contain the password and is wiped on drop.
    pub fn resolve_placeholder(&self, value: &str) -> Zeroizing<String> {
        self.resolve_recursive(value, MAX_PLACEHOLDER_DEPTH)
    }

    fn resolve_recursive(&self, value: &str, depth: usize) -> Zeroizing<String> {
        if depth == 0 || !value.contains('{') {
            return Zeroizing::new(value.to_owned());
        }

        let mut out = Zeroizing::new(String::with_capacity(value.len()));
        let mut rest = value;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let Some(end) = tail.find('}') else {
                out.push_str(tail);
                return out;
            };
            let placeholder = &tail[1..end];
            match self.placeholder_value(placeholder) {
                Some(resolved) => out.push_str(&self.resolve_recursive(&resolved, depth - 1)),
                None => out.push_str(&tail[..=end]),
            }
            rest = &tail[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn placeholder_value(&self, placeholder: &str) -> Option<Zeroizing<String>> {
        let upper = placeholder.to_uppercase();
        match upper.as_str() {
            "TITLE" => Some(Zeroizing::new(self.title())),
            "USERNAME" => Some(Zeroizing::new(self.username())),
            "URL" => Some(Zeroizing::new(self.url())),
            "PASSWORD" => Some(Zeroizing::new(self.password().as_str().to_owned())),
            "NOTES" => Some(Zeroizing::new(self.notes())),
            _ if upper.starts_with("S:") => {
                let key = &placeholder[2..];
                let data = self.0.data.borrow();
                data.attributes
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| Zeroizing::new(v.clone()))
            }
            _ => None,
        }
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Entry {}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("uuid", &self.uuid())
            .field("title", &self.0.data.borrow().title)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entry {
        let entry = Entry::new();
        entry.set_title("Email");
        entry.set_username("admin");
        entry.set_password("s3cret");
        entry.set_url("https://mail.example.com");
        entry
    }

    #[test]
    fn attribute_lookup_covers_standard_and_custom_fields() {
        let entry = sample();
        entry.set_custom_attribute("pin", "1234");
        let value = |name: &str| entry.attribute(name).map(|v| v.as_str().to_owned());
        assert_eq!(value(USERNAME).as_deref(), Some("admin"));
        assert_eq!(value(PASSWORD).as_deref(), Some("s3cret"));
        assert_eq!(value("pin").as_deref(), Some("1234"));
        assert!(entry.attribute("missing").is_none());
        assert_eq!(entry.custom_attribute_keys(), vec!["pin".to_string()]);
    }

    #[test]
    #[should_panic(expected = "standard field")]
    fn standard_names_are_not_custom_attributes() {
        Entry::new().set_custom_attribute(TITLE, "x");
    }

    #[test]
    fn placeholders_expand_fields_and_attributes() {
        let entry = sample();
        entry.set_custom_attribute("Tenant", "acme");
        entry.set_notes("{USERNAME}@{s:tenant}");
        assert_eq!(entry.resolve_placeholder("{NOTES}").as_str(), "admin@acme");
        assert_eq!(entry.resolve_placeholder("{unknown} {title").as_str(), "{unknown} {title");
        assert_eq!(entry.resolve_placeholder("pw={PASSWORD}").as_str(), "pw=s3cret");
    }

    #[test]
    fn self_referencing_placeholder_terminates() {
        let entry = Entry::new();
        entry.set_title("{TITLE}");
        assert_eq!(entry.resolve_placeholder("{TITLE}").as_str(), "{TITLE}");
    }

    #[test]
    fn clone_with_new_uuid_copies_data() {
        let entry = sample();
        entry.create_history_snapshot();
        let copy = entry.clone_with(EntryCloneFlags {
            include_history: true,
            ..EntryCloneFlags::default()
        });
        assert_ne!(copy.uuid(), entry.uuid());
        assert_eq!(copy.title(), "Email");
        assert_eq!(&*copy.password(), "s3cret");
        assert_eq!(copy.history_items().len(), 1);
        assert_eq!(copy.history_items()[0].uuid(), copy.uuid());
        assert!(copy.group().is_none());
    }

    #[test]
    fn clone_preserving_time_info_keeps_timestamps() {
        let entry = sample();
        let copy = entry.clone_with(EntryCloneFlags::NONE);
        assert_eq!(copy.uuid(), entry.uuid());
        assert_eq!(copy.time_info(), entry.time_info());
        assert!(copy.history_items().is_empty());
    }

    #[test]
    fn history_is_capped() {
        let entry = sample();
        for i in 0..12 {
            entry.set_notes(format!("rev {i}"));
            entry.create_history_snapshot();
        }
        let history = entry.history_items();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].notes(), "rev 2");
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("Email"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn password_copies_are_wiping_strings() {
        let entry = sample();
        let value: Zeroizing<String> = entry.attribute(PASSWORD).expect("password attribute");
        assert_eq!(value.as_str(), "s3cret");
        let resolved: Zeroizing<String> = entry.resolve_placeholder("{PASSWORD}");
        assert_eq!(resolved.as_str(), "s3cret");
    }

    #[test]
    fn out_of_range_index_within_group_leaves_entry_attached() {
        let group = Group::new();
        let (a, b) = (Entry::new(), Entry::new());
        group.add_entry(&a);
        group.add_entry(&b);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            a.set_parent(&group, Some(2));
        }));
        assert!(result.is_err());
        assert_eq!(group.entries(), vec![a.clone(), b]);
        assert_eq!(a.group(), Some(group));
    }

    #[test]
    #[should_panic(expected = "already used")]
    fn moving_entry_into_tree_with_its_uuid_panics() {
        let (left, right) = (Group::new(), Group::new());
        let entry = Entry::new();
        left.add_entry(&entry);
        right.add_entry(&entry.clone_with(EntryCloneFlags::NONE));
        entry.set_parent(&right, None);
    }

    #[test]
    fn moving_entry_within_its_tree_is_allowed() {
        let root = Group::new();
        let child = Group::new();
        child.set_parent(&root, None);
        let entry = Entry::new();
        root.add_entry(&entry);

        entry.set_parent(&child, None);
        assert_eq!(entry.group(), Some(child));
        assert!(root.entries().is_empty());
    }
}
