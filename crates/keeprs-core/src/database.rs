//! In-memory database holding the root group, tombstones and custom icons.
//!
//! Persistence is someone else's job; this type only provides what the tree
//! needs from its owner.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::events::{Observers, SubscriptionId, TreeEvent};
use crate::group::Group;
use crate::models::DeletedObject;

pub(crate) struct DatabaseNode {
    root: RefCell<Option<Group>>,
    deleted_objects: RefCell<Vec<DeletedObject>>,
    custom_icons: RefCell<BTreeMap<Uuid, Vec<u8>>>,
    observers: Observers,
    config: Config,
}

/// Owner of a credential tree.
///
/// Cloning the handle shares the same database.
#[derive(Clone)]
pub struct Database(Rc<DatabaseNode>);

impl Database {
    /// Create a database with an empty root group and default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let db = Self(Rc::new(DatabaseNode {
            root: RefCell::new(None),
            deleted_objects: RefCell::new(Vec::new()),
            custom_icons: RefCell::new(BTreeMap::new()),
            observers: Observers::default(),
            config,
        }));

        let root = Group::new();
        root.set_name("Root");
        db.set_root_group(root);
        db
    }

    pub(crate) fn downgrade(&self) -> Weak<DatabaseNode> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(node: &Weak<DatabaseNode>) -> Option<Self> {
        node.upgrade().map(Self)
    }

    pub fn ptr_eq(&self, other: &Database) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn root_group(&self) -> Group {
        self.0
            .root
            .borrow()
            .clone()
            .expect("database always has a root group")
    }

    /// Replace the root group. The previous root loses its database link.
    ///
    /// Panics if `group` currently has a parent.
    pub fn set_root_group(&self, group: Group) {
        assert!(
            group.parent_group().is_none(),
            "a root group cannot have a parent"
        );

        let previous = self.0.root.borrow_mut().take();
        if let Some(previous) = previous {
            previous.rec_set_database(None);
        }

        group.rec_set_database(Some(self));
        *self.0.root.borrow_mut() = Some(group);
    }

    pub fn is_root_group(&self, group: &Group) -> bool {
        self.0.root.borrow().as_ref() == Some(group)
    }

    /// Record a tombstone for `uuid`.
    pub fn add_deleted_object(&self, uuid: Uuid, deletion_time: DateTime<Utc>) {
        tracing::debug!(%uuid, "recording deleted object");
        self.0.deleted_objects.borrow_mut().push(DeletedObject {
            uuid,
            deletion_time,
        });
    }

    pub fn deleted_objects(&self) -> Vec<DeletedObject> {
        self.0.deleted_objects.borrow().clone()
    }

    pub fn contains_deleted_object(&self, uuid: Uuid) -> bool {
        self.0.deleted_objects.borrow().iter().any(|d| d.uuid == uuid)
    }

    pub fn add_custom_icon(&self, uuid: Uuid, data: Vec<u8>) {
        assert!(!uuid.is_nil(), "custom icon uuid must not be nil");
        self.0.custom_icons.borrow_mut().insert(uuid, data);
    }

    pub fn contains_custom_icon(&self, uuid: Uuid) -> bool {
        self.0.custom_icons.borrow().contains_key(&uuid)
    }

    pub fn custom_icon(&self, uuid: Uuid) -> Option<Vec<u8>> {
        self.0.custom_icons.borrow().get(&uuid).cloned()
    }

    /// Copy a custom icon from `source` unless this database already has it.
    pub(crate) fn import_custom_icon(&self, source: &Database, uuid: Uuid) {
        if self.contains_custom_icon(uuid) {
            return;
        }
        if let Some(data) = source.custom_icon(uuid) {
            self.add_custom_icon(uuid, data);
        }
    }

    /// Register a handler for every change raised inside this database.
    pub fn subscribe(&self, handler: impl Fn(&TreeEvent) + 'static) -> SubscriptionId {
        self.0.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.0.observers.unsubscribe(id)
    }

    pub(crate) fn notify(&self, event: &TreeEvent) {
        self.0.observers.notify(event);
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Database {}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("root", &self.0.root.borrow())
            .field("deleted_objects", &self.0.deleted_objects.borrow().len())
            .field("custom_icons", &self.0.custom_icons.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now;

    #[test]
    fn new_database_owns_named_root() {
        let db = Database::new();
        let root = db.root_group();
        assert_eq!(root.name(), "Root");
        assert_eq!(root.database(), Some(db.clone()));
        assert!(db.is_root_group(&root));
        assert!(db.deleted_objects().is_empty());
    }

    #[test]
    fn replacing_root_detaches_previous_one() {
        let db = Database::new();
        let old = db.root_group();
        let child = Group::new();
        child.set_parent(&old, None);

        db.set_root_group(Group::new());
        assert!(old.database().is_none());
        assert!(child.database().is_none());
        assert!(db.root_group().database().is_some());
    }

    #[test]
    fn deleted_objects_are_kept_in_order() {
        let db = Database::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        db.add_deleted_object(a, now());
        db.add_deleted_object(b, now());
        let uuids: Vec<_> = db.deleted_objects().iter().map(|d| d.uuid).collect();
        assert_eq!(uuids, vec![a, b]);
        assert!(db.contains_deleted_object(a));
    }

    #[test]
    fn custom_icons_are_imported_once() {
        let source = Database::new();
        let target = Database::new();
        let icon = Uuid::new_v4();
        source.add_custom_icon(icon, vec![1, 2, 3]);
        target.add_custom_icon(icon, vec![9]);

        target.import_custom_icon(&source, icon);
        assert_eq!(target.custom_icon(icon), Some(vec![9]));
    }
}
