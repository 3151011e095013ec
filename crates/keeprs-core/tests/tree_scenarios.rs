//! End-to-end behaviour of the credential tree through the public API.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use keeprs_core::models::now;
use keeprs_core::{
    Database, Entry, EntryCloneFlags, Group, GroupCloneFlags, Icon, SearchEngine, TreeEvent,
    TriState,
};
use uuid::Uuid;

fn entry(title: &str) -> Entry {
    let entry = Entry::new();
    entry.set_title(title);
    entry
}

fn group(parent: &Group, name: &str) -> Group {
    let group = Group::new();
    group.set_name(name);
    group.set_parent(parent, None);
    group
}

/// Root with `General/`, `Work/` and `Work/Archive/`, each holding entries.
fn sample_db() -> Database {
    let db = Database::new();
    let root = db.root_group();
    root.add_entry(&entry("Top"));

    let general = group(&root, "General");
    general.add_entry(&entry("Email"));
    general.add_entry(&entry("Forum"));

    let work = group(&root, "Work");
    work.add_entry(&entry("VPN"));
    let archive = group(&work, "Archive");
    archive.add_entry(&entry("Old VPN"));

    db
}

fn uuids(group: &Group) -> HashSet<Uuid> {
    let mut set: HashSet<Uuid> = group.groups_recursive(true).iter().map(Group::uuid).collect();
    set.extend(group.entries_recursive(false).iter().map(Entry::uuid));
    set
}

#[test]
fn every_group_is_found_by_its_own_path() {
    let db = sample_db();
    let root = db.root_group();
    for group in root.groups_recursive(true) {
        let found = root.find_group_by_path(&group.path());
        assert_eq!(found.as_ref(), Some(&group), "path {}", group.path());
    }
    assert_eq!(root.find_group_by_path("Work/Archive").map(|g| g.name()), Some("Archive".into()));
}

#[test]
fn entries_are_found_by_their_own_path() {
    let db = sample_db();
    let root = db.root_group();
    for entry in root.entries_recursive(false) {
        let path = entry.path().expect("attached entry has a path");
        assert_eq!(root.find_entry_by_path(&path).as_ref(), Some(&entry));
    }
}

#[test]
fn regenerated_clone_is_disjoint_and_preserving_clone_is_identical() {
    let db = sample_db();
    let work = db.root_group().find_group_by_path("/Work/").expect("work group");

    let fresh = work.clone_with(EntryCloneFlags::default(), GroupCloneFlags::default());
    assert!(uuids(&work).is_disjoint(&uuids(&fresh)));
    assert_eq!(fresh.print(true, true), work.print(true, true));

    let same = work.clone_with(
        EntryCloneFlags::NONE,
        GroupCloneFlags {
            include_entries: true,
            ..GroupCloneFlags::NONE
        },
    );
    assert_eq!(uuids(&work), uuids(&same));
    assert!(same.database().is_none());
}

#[test]
fn destroying_attached_entry_leaves_one_tombstone() {
    let db = sample_db();
    let email = db.root_group().find_entry("/General/Email").expect("email entry");
    let uuid = email.uuid();

    let started = now();
    email.destroy();

    let tombstones = db.deleted_objects();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].uuid, uuid);
    assert!(tombstones[0].deletion_time >= started);
    assert!(db.root_group().find_entry_by_uuid(uuid).is_none());
}

#[test]
fn recursive_print_lists_titles_and_subgroups() {
    let top = Group::new();
    top.add_entry(&entry("first"));
    top.add_entry(&entry("second"));
    let sub = group(&top, "Sub");
    sub.add_entry(&entry("third"));

    let printed = top.print(true, false);
    assert_eq!(printed, "first\nsecond\nSub/\n  third\n");
    assert!(!printed.contains("[empty]"));
}

#[test]
fn disabled_grandparent_blanks_auto_type_sequence() {
    let top = Group::new();
    top.set_auto_type_enabled(TriState::Disable);
    let middle = group(&top, "middle");
    let leaf = group(&middle, "leaf");
    leaf.set_default_auto_type_sequence("{PASSWORD}{ENTER}");

    assert_eq!(leaf.effective_auto_type_sequence(), "");

    top.set_auto_type_enabled(TriState::Inherit);
    assert_eq!(leaf.effective_auto_type_sequence(), "{PASSWORD}{ENTER}");
    assert_eq!(middle.effective_auto_type_sequence(), "{USERNAME}{TAB}{PASSWORD}{ENTER}");
}

#[test]
fn inserting_and_removing_entry_updates_counts_and_tombstones() {
    let db = Database::new();
    let root = db.root_group();
    let e = entry("E");

    assert_eq!(root.entries().len(), 0);
    root.add_entry(&e);
    assert_eq!(root.entries().len(), 1);
    assert_eq!(e.database(), Some(db.clone()));

    root.remove_entry(&e);
    assert_eq!(root.entries().len(), 0);
    assert_eq!(db.deleted_objects().len(), 1);
    assert!(e.group().is_none());
}

#[test]
fn destroying_group_tombstones_entries_then_children_then_itself() {
    let db = sample_db();
    let work = db.root_group().find_group_by_path("/Work/").expect("work group");
    let vpn = work.find_entry("VPN").expect("vpn entry");
    let archive = work.find_child_by_name("Archive").expect("archive group");
    let old_vpn = archive.entries()[0].clone();

    work.destroy();

    let order: Vec<Uuid> = db.deleted_objects().iter().map(|d| d.uuid).collect();
    assert_eq!(order, vec![vpn.uuid(), old_vpn.uuid(), archive.uuid(), work.uuid()]);
    assert!(db.root_group().find_child_by_name("Work").is_none());
    assert!(work.parent_group().is_none());
    assert!(work.database().is_none());
}

#[test]
fn moving_group_between_databases() {
    let source = sample_db();
    let target = Database::new();

    let icon = Uuid::new_v4();
    source.add_custom_icon(icon, vec![0x89, b'P', b'N', b'G']);

    let work = source.root_group().find_group_by_path("/Work/").expect("work group");
    let archive = work.find_child_by_name("Archive").expect("archive group");
    archive.entries()[0].set_icon(Icon::Custom(icon));
    let moved = uuids(&work);

    work.set_parent(&target.root_group(), None);

    let tombstones: HashSet<Uuid> = source.deleted_objects().iter().map(|d| d.uuid).collect();
    assert_eq!(tombstones, moved);
    assert_eq!(target.custom_icon(icon), Some(vec![0x89, b'P', b'N', b'G']));
    assert!(target.deleted_objects().is_empty());

    for g in work.groups_recursive(true) {
        assert_eq!(g.database(), Some(target.clone()));
    }
    for e in work.entries_recursive(false) {
        assert_eq!(e.database(), Some(target.clone()));
    }
    assert!(source.root_group().find_group_by_uuid(work.uuid()).is_none());
    assert_eq!(target.root_group().find_group_by_path("/Work/Archive/"), Some(archive));
}

#[test]
fn moving_group_within_database_keeps_identity() {
    let db = sample_db();
    let root = db.root_group();
    let archive = root.find_group_by_path("/Work/Archive/").expect("archive group");

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    db.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    archive.set_parent(&root, Some(0));

    assert!(db.deleted_objects().is_empty());
    assert_eq!(root.children()[0], archive);
    let events = events.borrow();
    assert!(matches!(events.first(), Some(TreeEvent::GroupAboutToMove { index: 0, .. })));
    assert!(matches!(events.last(), Some(TreeEvent::GroupMoved { .. })));
}

#[test]
#[should_panic]
fn moving_group_into_own_subtree_panics() {
    let db = sample_db();
    let root = db.root_group();
    let work = root.find_group_by_path("/Work/").expect("work group");
    let archive = work.find_child_by_name("Archive").expect("archive group");
    work.set_parent(&archive, None);
}

#[test]
fn database_hears_about_nested_changes() {
    let db = sample_db();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let id = db.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    let archive = db.root_group().find_group_by_path("/Work/Archive/").expect("archive group");
    let e = entry("New");
    archive.add_entry(&e);

    {
        let seen = events.borrow();
        assert_eq!(
            seen.as_slice(),
            &[
                TreeEvent::EntryAboutToAdd { group: archive.uuid(), entry: e.uuid() },
                TreeEvent::Modified { group: archive.uuid() },
                TreeEvent::EntryAdded { group: archive.uuid(), entry: e.uuid() },
            ]
        );
    }

    assert!(db.unsubscribe(id));
    e.set_title("Renamed");
    assert_eq!(events.borrow().len(), 3);
}

#[test]
fn query_with_field_and_exclusion_picks_single_entry() {
    let root = Group::new();

    let work = group(&root, "Work");
    let internal = entry("Email");
    internal.set_username("admin");
    internal.set_url("https://internal");
    work.add_entry(&internal);

    let work2 = group(&root, "Work2");
    let other = entry("Email");
    other.set_url("http://other");
    work2.add_entry(&other);

    let engine = SearchEngine::default();
    assert_eq!(engine.search("title:Email -url:http:", &root), vec![internal.clone()]);
    assert_eq!(engine.search("title:Email", &root).len(), 2);
    assert!(engine.search("title:Email -url:http", &root).is_empty());
}

#[test]
fn search_does_not_descend_past_immediate_children() {
    let db = sample_db();
    let engine = SearchEngine::default();
    let found: Vec<String> = engine
        .search("vpn", &db.root_group())
        .iter()
        .map(Entry::title)
        .collect();
    assert_eq!(found, vec!["VPN"]);
}

#[test]
fn history_snapshots_are_capped_by_database_config() {
    let db = Database::new();
    let e = entry("rotating");
    db.root_group().add_entry(&e);

    for round in 0..15 {
        e.set_password(format!("pw-{round}").as_str());
        e.create_history_snapshot();
    }

    let history = e.history_items();
    assert_eq!(history.len(), db.config().history_max_items);
    assert_eq!(history.last().map(|h| h.password().to_string()), Some("pw-14".to_string()));
    assert!(history.iter().all(|h| h.uuid() == e.uuid()));
}
