//! Read-only traversal: uuid and path lookups, listings.

use std::collections::BTreeSet;

use uuid::Uuid;

use super::Group;
use crate::entry::Entry;
use crate::models::{escape_path_segment, split_entry_path};

/// Placeholder line printed for a group without entries or children.
const EMPTY_GROUP_LINE: &str = "[empty]";

impl Group {
    /// Every entry in the subtree, in pre-order: this group's entries, then
    /// each child group's entries recursively. With `include_history`, each
    /// entry is followed by its history snapshots.
    pub fn entries_recursive(&self, include_history: bool) -> Vec<Entry> {
        let mut out = Vec::new();
        self.collect_entries(include_history, &mut out);
        out
    }

    fn collect_entries(&self, include_history: bool, out: &mut Vec<Entry>) {
        for entry in self.entries() {
            let history = if include_history {
                entry.history_items()
            } else {
                Vec::new()
            };
            out.push(entry);
            out.extend(history);
        }
        for child in self.children() {
            child.collect_entries(include_history, out);
        }
    }

    /// Groups of the subtree in pre-order.
    pub fn groups_recursive(&self, include_self: bool) -> Vec<Group> {
        let mut out = Vec::new();
        if include_self {
            out.push(self.clone());
        }
        for child in self.children() {
            out.extend(child.groups_recursive(true));
        }
        out
    }

    /// Custom icon uuids used anywhere in the subtree, history included.
    pub fn custom_icons_recursive(&self) -> BTreeSet<Uuid> {
        let mut icons: BTreeSet<Uuid> = self
            .groups_recursive(true)
            .iter()
            .filter_map(|g| g.icon().custom_uuid())
            .collect();
        icons.extend(
            self.entries_recursive(true)
                .iter()
                .filter_map(|e| e.icon().custom_uuid()),
        );
        icons
    }

    pub fn find_entry_by_uuid(&self, uuid: Uuid) -> Option<Entry> {
        assert!(!uuid.is_nil(), "lookup uuid must not be nil");
        self.entries_recursive(false).into_iter().find(|e| e.uuid() == uuid)
    }

    pub fn find_group_by_uuid(&self, uuid: Uuid) -> Option<Group> {
        assert!(!uuid.is_nil(), "lookup uuid must not be nil");
        self.groups_recursive(true).into_iter().find(|g| g.uuid() == uuid)
    }

    pub fn find_child_by_name(&self, name: &str) -> Option<Group> {
        self.children().into_iter().find(|g| g.name() == name)
    }

    /// Resolve an entry by hex uuid, then by path, then by exact title.
    pub fn find_entry(&self, id: &str) -> Option<Entry> {
        if let Ok(uuid) = Uuid::try_parse(id) {
            if !uuid.is_nil() {
                if let Some(entry) = self.find_entry_by_uuid(uuid) {
                    return Some(entry);
                }
            }
        }

        if let Some(entry) = self.find_entry_by_path(id) {
            return Some(entry);
        }

        self.entries_recursive(false)
            .into_iter()
            .find(|e| e.title() == id)
    }

    /// Find an entry by `/`-separated path relative to this group.
    ///
    /// The leading `/` is optional; a `/` inside a title is written `\/`.
    pub fn find_entry_by_path(&self, path: &str) -> Option<Entry> {
        self.find_entry_by_path_from(path, "")
    }

    /// Like [`Group::find_entry_by_path`] with `base_path` prefixed to every
    /// candidate path of this group.
    pub fn find_entry_by_path_from(&self, path: &str, base_path: &str) -> Option<Entry> {
        for entry in self.entries() {
            let candidate = format!("{base_path}{}", escape_path_segment(&entry.title()));
            if path == candidate || path == format!("/{candidate}") {
                return Some(entry);
            }
        }

        self.children().into_iter().find_map(|child| {
            let child_base = format!("{base_path}{}/", child.name());
            child.find_entry_by_path_from(path, &child_base)
        })
    }

    /// Find a group by path. Missing leading/trailing slashes are added;
    /// the empty path and `/` name this group.
    pub fn find_group_by_path(&self, path: &str) -> Option<Group> {
        let normalized = normalize_group_path(path);
        self.find_group_by_path_from(&normalized, "/")
    }

    fn find_group_by_path_from(&self, path: &str, base_path: &str) -> Option<Group> {
        if path == base_path {
            return Some(self.clone());
        }
        self.children().into_iter().find_map(|child| {
            let child_base = format!("{base_path}{}/", child.name());
            if path.starts_with(&child_base) {
                child.find_group_by_path_from(path, &child_base)
            } else {
                None
            }
        })
    }

    /// Names from the top of the tree down to this group.
    pub fn hierarchy(&self) -> Vec<String> {
        let mut names = vec![self.name()];
        let mut current = self.parent_group();
        while let Some(group) = current {
            names.push(group.name());
            current = group.parent_group();
        }
        names.reverse();
        names
    }

    /// Normalized path of this group: `/` for the top of the tree, otherwise
    /// `/Name/.../Name/` (the top group's own name is not part of it).
    pub fn path(&self) -> String {
        match self.parent_group() {
            Some(parent) => format!("{}{}/", parent.path(), self.name()),
            None => "/".to_string(),
        }
    }

    /// Text listing of the group. Children are indented by two spaces per
    /// level, or with `flatten` prefixed by their path relative to this group.
    pub fn print(&self, recursive: bool, flatten: bool) -> String {
        let mut out = String::new();
        self.print_into(&mut out, recursive, flatten, 0, "");
        out
    }

    fn print_into(&self, out: &mut String, recursive: bool, flatten: bool, depth: usize, prefix: &str) {
        let lead = if flatten {
            prefix.to_string()
        } else {
            "  ".repeat(depth)
        };

        let entries = self.entries();
        let children = self.children();
        if entries.is_empty() && children.is_empty() {
            out.push_str(&format!("{lead}{EMPTY_GROUP_LINE}\n"));
            return;
        }

        for entry in &entries {
            out.push_str(&format!("{lead}{}\n", entry.title()));
        }
        for child in &children {
            out.push_str(&format!("{lead}{}/\n", child.name()));
            if recursive {
                let child_prefix = format!("{prefix}{}/", child.name());
                child.print_into(out, recursive, flatten, depth + 1, &child_prefix);
            }
        }
    }

    /// Entry paths below this group containing `term`, ignoring case.
    /// `current_path` is prefixed to every path.
    pub fn locate(&self, term: &str, current_path: &str) -> Vec<String> {
        let needle = term.to_lowercase();
        let mut found = Vec::new();

        for entry in self.entries() {
            let entry_path = format!("{current_path}{}", escape_path_segment(&entry.title()));
            if entry_path.to_lowercase().contains(&needle) {
                found.push(entry_path);
            }
        }
        for child in self.children() {
            let child_path = format!("{current_path}{}/", child.name());
            found.extend(child.locate(term, &child_path));
        }
        found
    }

    /// Create an entry titled after the last segment of `path`, inside the
    /// group named by the rest of it.
    ///
    /// Returns `None` if an entry already exists at `path` or the group does
    /// not exist.
    pub fn add_entry_with_path(&self, path: &str) -> Option<Entry> {
        if self.find_entry_by_path(path).is_some() {
            return None;
        }

        let mut segments = split_entry_path(path);
        let title = segments.pop().unwrap_or_default();
        let group_path = segments
            .iter()
            .map(|s| escape_path_segment(s))
            .collect::<Vec<_>>()
            .join("/");
        let group = self.find_group_by_path(&group_path)?;

        let entry = Entry::new();
        entry.set_title(title);
        entry.set_parent(&group, None);
        Some(entry)
    }
}

fn normalize_group_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);
    if !path.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
