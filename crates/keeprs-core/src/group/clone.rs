//! Deep copies and comparison.

use uuid::Uuid;

use super::Group;
use crate::models::{now, EntryCloneFlags, GroupCloneFlags};

impl Group {
    /// Deep copy of the subtree. The copy is detached from any parent or
    /// database.
    pub fn clone_with(&self, entry_flags: EntryCloneFlags, group_flags: GroupCloneFlags) -> Group {
        let uuid = if group_flags.new_uuid { Uuid::new_v4() } else { self.uuid() };
        let cloned = Group::with_uuid(uuid);
        cloned.set_update_time_info(false);

        *cloned.0.data.borrow_mut() = self.0.data.borrow().clone();
        *cloned.0.custom_data.borrow_mut() = self.0.custom_data.borrow().clone();

        if group_flags.include_entries {
            for entry in self.entries() {
                cloned.add_entry(&entry.clone_with(entry_flags));
            }
            for child in self.children() {
                let cloned_child = child.clone_with(entry_flags, group_flags);
                cloned_child.set_update_time_info(false);
                cloned_child.set_parent(&cloned, None);
                cloned_child.set_update_time_info(true);
            }
        }

        if group_flags.reset_time_info {
            cloned.0.data.borrow_mut().time_info.reset(now());
        }
        cloned.set_update_time_info(true);
        cloned
    }

    /// Take over data, custom data and the last-top-visible entry of `other`.
    pub fn copy_data_from(&self, other: &Group) {
        *self.0.data.borrow_mut() = other.0.data.borrow().clone();
        *self.0.custom_data.borrow_mut() = other.0.custom_data.borrow().clone();
        *self.0.last_top_visible_entry.borrow_mut() = other.0.last_top_visible_entry.borrow().clone();
    }

    /// Same uuid, data, custom data and the same child and entry uuids in the
    /// same order.
    pub fn equals(&self, other: &Group) -> bool {
        if self.uuid() != other.uuid() {
            return false;
        }
        if *self.0.data.borrow() != *other.0.data.borrow() {
            return false;
        }
        if *self.0.custom_data.borrow() != *other.0.custom_data.borrow() {
            return false;
        }

        let child_uuids = |g: &Group| g.children().iter().map(Group::uuid).collect::<Vec<_>>();
        let entry_uuids = |g: &Group| g.entries().iter().map(|e| e.uuid()).collect::<Vec<_>>();
        child_uuids(self) == child_uuids(other) && entry_uuids(self) == entry_uuids(other)
    }
}
