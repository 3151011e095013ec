//! keeprs-demo - browse and search a sample in-memory vault
//!
//! The vault is built at startup. The only file touched is the configuration,
//! which is created with defaults at the default location when missing.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use keeprs_core::entry::DEFAULT_ATTRIBUTES;
use keeprs_core::{Config, Database, Entry, Group, SearchEngine, TriState};

/// keeprs-demo - browse and search a sample vault
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the contents of a group
    Ls {
        /// Group path, defaults to the root group
        group: Option<String>,
        /// Descend into sub-groups
        #[arg(short = 'R', long)]
        recursive: bool,
        /// Print paths instead of indenting (implies --recursive)
        #[arg(short, long)]
        flatten: bool,
    },
    /// Find entry paths containing a term
    Locate { term: String },
    /// Search entries with a query such as `user:admin -pass:123`
    Search {
        query: String,
        /// Group path to start from, defaults to the root group
        #[arg(short, long)]
        group: Option<String>,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Show the attributes of an entry
    Show {
        /// Entry path, title or uuid
        entry: String,
        /// Attribute to print; may be repeated
        #[arg(short, long = "attributes")]
        attributes: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keeprs_core=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config)?;

    let db = sample_vault(config.clone());
    let root = db.root_group();
    tracing::debug!("Sample vault has {} entries", root.entries_recursive(false).len());

    match args.command {
        Command::Ls {
            group,
            recursive,
            flatten,
        } => {
            let group = resolve_group(&root, group.as_deref())?;
            print!("{}", group.print(recursive || flatten, flatten));
        }
        Command::Locate { term } => {
            let found = root.locate(&term, "/");
            if found.is_empty() {
                bail!("No results for that search term.");
            }
            for path in found {
                println!("{path}");
            }
        }
        Command::Search {
            query,
            group,
            case_sensitive,
        } => {
            let group = resolve_group(&root, group.as_deref())?;
            let mut engine = SearchEngine::from_config(&config);
            if case_sensitive {
                engine.set_case_sensitive(true);
            }
            engine.try_parse_terms(&query)?;
            for entry in engine.search(&query, &group) {
                println!("{}", entry.path().unwrap_or_else(|| entry.title()));
            }
        }
        Command::Show { entry, attributes } => {
            let Some(found) = root.find_entry(&entry) else {
                bail!("Could not find entry with path {entry}.");
            };
            show_entry(&found, &attributes)?;
        }
    }

    Ok(())
}

fn resolve_group(root: &Group, path: Option<&str>) -> Result<Group> {
    match path {
        None => Ok(root.clone()),
        Some(path) => match root.find_group_by_path(path) {
            Some(group) => Ok(group),
            None => bail!("Cannot find group {path}."),
        },
    }
}

/// Print `name: value` lines for the default attributes, or bare values for
/// the requested ones, followed by a `---` separator.
fn show_entry(entry: &Entry, attributes: &[String]) -> Result<()> {
    let show_names = attributes.is_empty();
    let names: Vec<String> = if show_names {
        DEFAULT_ATTRIBUTES.iter().map(|s| s.to_string()).collect()
    } else {
        attributes.to_vec()
    };

    let mut unknown = Vec::new();
    for name in &names {
        let Some(value) = entry.attribute(name) else {
            tracing::error!("unknown attribute '{}'", name);
            unknown.push(name.clone());
            continue;
        };
        let value = entry.resolve_placeholder(&value);
        if show_names {
            println!("{name}: {}", value.as_str());
        } else {
            println!("{}", value.as_str());
        }
    }
    println!("---");

    if !unknown.is_empty() {
        bail!("Unknown attributes: {}", unknown.join(", "));
    }
    Ok(())
}

fn add_entry(group: &Group, title: &str, username: &str, password: &str, url: &str) -> Entry {
    let entry = Entry::new();
    entry.set_title(title);
    entry.set_username(username);
    entry.set_password(password);
    entry.set_url(url);
    group.add_entry(&entry);
    entry
}

fn add_group(parent: &Group, name: &str) -> Group {
    let group = Group::new();
    group.set_name(name);
    group.set_parent(parent, None);
    group
}

fn sample_vault(config: Config) -> Database {
    let db = Database::with_config(config);
    let root = db.root_group();
    root.set_name("Sample Vault");

    add_entry(&root, "Sample Entry", "User Name", "Password", "http://www.somesite.com/");

    let general = add_group(&root, "General");
    let email = add_entry(&general, "Email", "admin", "hunter2", "https://mail.example.com");
    email.set_notes("Login for {USERNAME}");
    let forum = add_entry(&general, "Forum", "{S:handle}", "456", "http://forum.example.org");
    forum.set_custom_attribute("handle", "night_owl");

    let work = add_group(&root, "Work");
    let vpn = add_entry(&work, "VPN", "jdoe", "123", "vpn.example.com");
    vpn.set_attachment("client.ovpn", b"remote vpn.example.com 1194".as_slice());
    add_entry(&work, "Email", "jdoe", "s3cret", "http://intranet.example.com");

    let archive = add_group(&work, "Archive");
    add_entry(&archive, "Old Email", "jdoe", "retired", "");

    let private = add_group(&root, "Private");
    private.set_searching_enabled(TriState::Disable);
    add_entry(&private, "Diary", "me", "dear-diary", "");

    let bin = Group::create_recycle_bin();
    bin.set_parent(&root, None);

    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_reaches_the_sample_vault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        std::fs::write(&path, "search_case_sensitive = true\nhistory_max_items = 3\n").unwrap();

        let args = Args::try_parse_from([
            "keeprs-demo",
            "--config",
            path.to_str().unwrap(),
            "search",
            "email",
        ])
        .unwrap();
        let db = sample_vault(Config::load(args.config).unwrap());

        assert!(db.config().search_case_sensitive);
        assert_eq!(db.config().history_max_items, 3);
        assert!(SearchEngine::from_config(db.config()).is_case_sensitive());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "keeprs-demo",
            "-c",
            dir.path().join("absent.toml").to_str().unwrap(),
            "ls",
        ])
        .unwrap();
        assert!(Config::load(args.config).is_err());
    }
}
