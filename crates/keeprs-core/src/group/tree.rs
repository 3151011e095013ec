//! Structural changes: membership, moves and removal.

use std::collections::HashSet;

use uuid::Uuid;

use super::Group;
use crate::database::Database;
use crate::entry::Entry;
use crate::events::TreeEvent;
use crate::models::now;

impl Group {
    pub(crate) fn entry_index(&self, entry: &Entry) -> Option<usize> {
        self.0.entries.borrow().iter().position(|e| e == entry)
    }

    fn child_index(&self, child: &Group) -> Option<usize> {
        self.0.children.borrow().iter().position(|g| g == child)
    }

    /// Top of the tree this group belongs to.
    pub(crate) fn tree_root(&self) -> Group {
        let mut top = self.clone();
        while let Some(parent) = top.parent_group() {
            top = parent;
        }
        top
    }

    /// Panics if one of `incoming` already names a group or entry anywhere in
    /// this group's tree.
    pub(crate) fn assert_uuids_unused(&self, incoming: impl IntoIterator<Item = Uuid>) {
        let top = self.tree_root();
        let mut used: HashSet<Uuid> = top.groups_recursive(true).iter().map(Group::uuid).collect();
        used.extend(top.entries_recursive(false).iter().map(Entry::uuid));
        for uuid in incoming {
            assert!(!used.contains(&uuid), "uuid {uuid} is already used in this tree");
        }
    }

    /// Append a detached entry to this group.
    ///
    /// Panics if the entry already belongs to a group (use
    /// [`Entry::set_parent`] to move entries between groups) or if its uuid
    /// is already taken in this tree.
    pub fn add_entry(&self, entry: &Entry) {
        assert!(
            self.entry_index(entry).is_none(),
            "group {} already contains entry {}",
            self.name(),
            entry.title()
        );
        assert!(
            entry.group().is_none(),
            "entry {} belongs to another group",
            entry.title()
        );
        self.assert_uuids_unused([entry.uuid()]);
        self.insert_entry(entry, None);
    }

    /// Remove a direct member entry.
    ///
    /// If the group is attached to a database, the entry's uuid is recorded
    /// there as deleted. Panics if the entry is not a direct member.
    pub fn remove_entry(&self, entry: &Entry) {
        let deletion_time = now();
        self.detach_entry(entry);
        if let Some(db) = self.database() {
            db.add_deleted_object(entry.uuid(), deletion_time);
        }
    }

    pub(crate) fn insert_entry(&self, entry: &Entry, index: Option<usize>) {
        let len = self.0.entries.borrow().len();
        let index = index.unwrap_or(len);
        assert!(index <= len, "entry index {index} out of range (0..={len})");

        self.emit(TreeEvent::EntryAboutToAdd {
            group: self.uuid(),
            entry: entry.uuid(),
        });
        self.0.entries.borrow_mut().insert(index, entry.clone());
        entry.set_group_link(Some(self));
        self.modified();
        self.emit(TreeEvent::EntryAdded {
            group: self.uuid(),
            entry: entry.uuid(),
        });
    }

    pub(crate) fn detach_entry(&self, entry: &Entry) {
        let Some(index) = self.entry_index(entry) else {
            panic!("group {} does not contain {}", self.name(), entry.title());
        };

        self.emit(TreeEvent::EntryAboutToRemove {
            group: self.uuid(),
            entry: entry.uuid(),
        });
        self.0.entries.borrow_mut().remove(index);
        entry.set_group_link(None);
        self.modified();
        self.emit(TreeEvent::EntryRemoved {
            group: self.uuid(),
            entry: entry.uuid(),
        });
    }

    /// Whether `other` is this group or one of its ancestors.
    fn is_self_or_ancestor_of(&self, other: &Group) -> bool {
        let mut current = Some(other.clone());
        while let Some(group) = current {
            if &group == self {
                return true;
            }
            current = group.parent_group();
        }
        false
    }

    fn is_database_root(&self) -> bool {
        self.database().is_some_and(|db| db.is_root_group(self))
    }

    /// Make this group a child of `parent` at `index` (`None` appends).
    ///
    /// Moving inside one database keeps the subtree's identity and only
    /// records the location change. Moving out of a database tombstones the
    /// whole subtree there, copies the custom icons it uses into the new
    /// database and relinks every descendant to it.
    ///
    /// Panics when moving a database root, moving a group into its own
    /// subtree, with an out-of-range index, or when a uuid of the subtree is
    /// already used in the target tree. All checks run before anything moves.
    pub fn set_parent(&self, parent: &Group, index: Option<usize>) {
        assert!(!self.is_database_root(), "the root group of a database cannot be moved");
        assert!(
            !self.is_self_or_ancestor_of(parent),
            "group {} cannot be moved into its own subtree",
            self.name()
        );

        let old_db = self.database();
        let new_db = parent.database();
        let move_within_database = matches!((&old_db, &new_db), (Some(a), Some(b)) if a == b);
        let old_parent = self.parent_group();
        let same_parent = old_parent.as_ref() == Some(parent);

        // Within the same parent the group already occupies one slot.
        let len = parent.0.children.borrow().len();
        let max_index = if same_parent { len - 1 } else { len };
        let index = match index {
            Some(index) => {
                assert!(index <= max_index, "group index {index} out of range (0..={max_index})");
                index
            }
            None => max_index,
        };

        if same_parent && parent.child_index(self) == Some(index) {
            return;
        }

        if self.tree_root() != parent.tree_root() {
            let mut incoming: Vec<Uuid> = self.groups_recursive(true).iter().map(Group::uuid).collect();
            incoming.extend(self.entries_recursive(false).iter().map(Entry::uuid));
            parent.assert_uuids_unused(incoming);
        }

        if move_within_database {
            self.emit(TreeEvent::GroupAboutToMove {
                group: self.uuid(),
                parent: parent.uuid(),
                index,
            });
            if let Some(old_parent) = &old_parent {
                old_parent.0.children.borrow_mut().retain(|g| g != self);
            }
            *self.0.parent.borrow_mut() = parent.downgrade();
            parent.insert_child(self, index);
        } else {
            self.cleanup_parent();
            *self.0.parent.borrow_mut() = parent.downgrade();

            if let Some(old_db) = &old_db {
                self.rec_create_deleted_objects(old_db);
                if let Some(new_db) = &new_db {
                    for icon in self.custom_icons_recursive() {
                        new_db.import_custom_icon(old_db, icon);
                    }
                }
            }
            if old_db != new_db {
                self.rec_set_database(new_db.as_ref());
            }

            self.emit(TreeEvent::GroupAboutToAdd {
                group: self.uuid(),
                parent: parent.uuid(),
                index,
            });
            parent.insert_child(self, index);
        }

        tracing::debug!(
            group = %self.uuid(),
            parent = %parent.uuid(),
            index,
            move_within_database,
            "group reparented"
        );

        if self.can_update_time_info() {
            self.0.data.borrow_mut().time_info.location_changed = now();
        }
        self.emit_modified();

        if move_within_database {
            self.emit(TreeEvent::GroupMoved { group: self.uuid() });
        } else {
            self.emit(TreeEvent::GroupAdded { group: self.uuid() });
        }
    }

    fn insert_child(&self, child: &Group, index: usize) {
        let mut children = self.0.children.borrow_mut();
        assert!(
            index <= children.len(),
            "group index {index} out of range (0..={})",
            children.len()
        );
        children.insert(index, child.clone());
    }

    /// Unlink from the parent group, raising the removal events.
    fn cleanup_parent(&self) {
        let Some(parent) = self.parent_group() else {
            return;
        };
        self.emit(TreeEvent::GroupAboutToRemove { group: self.uuid() });
        parent.0.children.borrow_mut().retain(|g| g != self);
        *self.0.parent.borrow_mut() = Default::default();
        self.emit_modified();
        self.emit(TreeEvent::GroupRemoved { group: self.uuid() });
    }

    /// Tombstone every entry and group of this subtree, children first.
    fn rec_create_deleted_objects(&self, db: &Database) {
        let deletion_time = now();
        for entry in self.entries() {
            db.add_deleted_object(entry.uuid(), deletion_time);
        }
        for child in self.children() {
            child.rec_create_deleted_objects(db);
        }
        db.add_deleted_object(self.uuid(), deletion_time);
    }

    pub(crate) fn rec_set_database(&self, db: Option<&Database>) {
        *self.0.database.borrow_mut() = db.map(Database::downgrade).unwrap_or_default();
        for child in self.children() {
            child.rec_set_database(db);
        }
    }

    /// Take this group (with its subtree) out of its parent.
    ///
    /// When the tree is attached to a database, every uuid in the subtree is
    /// tombstoned and the subtree leaves the database. Panics on a database
    /// root.
    pub fn detach(&self) {
        assert!(!self.is_database_root(), "the root group of a database cannot be detached");
        if self.parent_group().is_none() {
            return;
        }

        let db = self.database();
        self.cleanup_parent();
        if let Some(db) = db {
            self.rec_create_deleted_objects(&db);
            self.rec_set_database(None);
        }
    }

    /// Discard this group and everything below it.
    ///
    /// Entries go first, then child groups (recursively), then the group
    /// itself; each leaves one tombstone when attached to a database.
    pub fn destroy(&self) {
        assert!(!self.is_database_root(), "the root group of a database cannot be destroyed");
        self.set_update_time_info(false);

        for entry in self.entries() {
            entry.destroy();
        }
        for child in self.children() {
            child.destroy();
        }

        if let (Some(db), Some(_)) = (self.database(), self.parent_group()) {
            db.add_deleted_object(self.uuid(), now());
        }

        self.cleanup_parent();
        self.rec_set_database(None);
    }
}
