//! Structured entry search.
//!
//! A query is a whitespace-separated list of terms:
//!
//! ```text
//! term      := modifiers? (field ':')? ("quoted text" | bareword)
//! modifiers := any combination of '+' (exact), '-' (exclude), '*' (raw regex)
//! field     := title | user* | pass* | url | notes | attr* | attach*
//! ```
//!
//! Every term has to pass for an entry to match. Without `*`, regex
//! metacharacters in the term are escaped and `*` / `?` act as wildcards.

use regex::{Regex, RegexBuilder};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::{VaultError, VaultResult};
use crate::group::Group;
use crate::models::TriState;

/// Characters escaped before wildcards are expanded.
const ESCAPED_CHARS: &str = "-[]{}()+.,\\/^$#";

/// Field a term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Field {
    /// Title, username, url and notes.
    #[default]
    All,
    Title,
    Username,
    Password,
    Url,
    Notes,
    /// Custom attribute names.
    Attribute,
    /// Attachment names.
    Attachment,
}

impl Field {
    /// Field selected by the text in front of `:`. Unknown names search all.
    pub fn parse(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "title" {
            Field::Title
        } else if lower.starts_with("user") {
            Field::Username
        } else if lower.starts_with("pass") {
            Field::Password
        } else if lower == "url" {
            Field::Url
        } else if lower == "notes" {
            Field::Notes
        } else if lower.starts_with("attr") {
            Field::Attribute
        } else if lower.starts_with("attach") {
            Field::Attachment
        } else {
            Field::All
        }
    }
}

/// One parsed unit of a query.
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub field: Field,
    /// Term text as typed (quotes removed).
    pub word: String,
    /// `-`: the entry passes only if the pattern does not match.
    pub exclude: bool,
    /// `+`: the pattern must match the whole field value.
    pub exact: bool,
    /// `None` when the pattern failed to compile; such a term never matches.
    regex: Option<Regex>,
}

impl SearchTerm {
    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Whether `entry` passes this term, taking `exclude` into account.
    pub fn matches(&self, entry: &Entry) -> bool {
        let found = match self.field {
            Field::Title => self.is_match(&entry.resolve_placeholder(&entry.title())),
            Field::Username => self.is_match(&entry.resolve_placeholder(&entry.username())),
            Field::Password => self.is_match(&entry.resolve_placeholder(&entry.password())),
            Field::Url => self.is_match(&entry.resolve_placeholder(&entry.url())),
            Field::Notes => self.is_match(&entry.notes()),
            Field::Attribute => entry.custom_attribute_keys().iter().any(|k| self.is_match(k)),
            Field::Attachment => entry.attachment_names().iter().any(|n| self.is_match(n)),
            Field::All => {
                self.is_match(&entry.resolve_placeholder(&entry.title()))
                    || self.is_match(&entry.resolve_placeholder(&entry.username()))
                    || self.is_match(&entry.resolve_placeholder(&entry.url()))
                    || self.is_match(&entry.notes())
            }
        };
        found != self.exclude
    }
}

/// Raw pieces of a term before pattern compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawTerm {
    modifiers: String,
    field: Option<String>,
    word: String,
}

/// Split a query into terms. Terms with an empty word are dropped.
fn tokenize(query: &str) -> Vec<RawTerm> {
    let chars: Vec<char> = query.chars().collect();
    let mut terms = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if chars[pos].is_whitespace() {
            pos += 1;
            continue;
        }

        let mut modifiers = String::new();
        while pos < chars.len() && matches!(chars[pos], '-' | '+' | '*') {
            modifiers.push(chars[pos]);
            pos += 1;
        }

        let mut field = None;
        let mut probe = pos;
        while probe < chars.len() && (chars[probe].is_alphanumeric() || chars[probe] == '_') {
            probe += 1;
        }
        if probe < chars.len() && chars[probe] == ':' {
            field = Some(chars[pos..probe].iter().collect::<String>());
            pos = probe + 1;
        }

        let (word, next) = read_quoted(&chars, pos).unwrap_or_else(|| read_bare(&chars, pos));
        pos = next;

        if !word.is_empty() {
            terms.push(RawTerm {
                modifiers,
                field,
                word,
            });
        }
    }

    terms
}

/// Quoted segment at `pos`, closed by an unescaped `"` followed by
/// whitespace or the end of the query. `\x` inside quotes yields `x`.
fn read_quoted(chars: &[char], pos: usize) -> Option<(String, usize)> {
    if chars.get(pos) != Some(&'"') {
        return None;
    }
    let mut word = String::new();
    let mut i = pos + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                word.push(chars[i + 1]);
                i += 2;
            }
            '"' => {
                let after = i + 1;
                if after == chars.len() || chars[after].is_whitespace() {
                    return Some((word, after));
                }
                return None;
            }
            c => {
                word.push(c);
                i += 1;
            }
        }
    }
    None
}

fn read_bare(chars: &[char], pos: usize) -> (String, usize) {
    let mut end = pos;
    while end < chars.len() && !chars[end].is_whitespace() {
        end += 1;
    }
    (chars[pos..end].iter().collect(), end)
}

/// Turn a term's text into a regex pattern: escape, then expand wildcards.
fn wildcard_pattern(word: &str) -> String {
    let mut escaped = String::with_capacity(word.len() * 2);
    for c in word.chars() {
        if ESCAPED_CHARS.contains(c) {
            escaped.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        } else {
            escaped.push(c);
        }
    }
    while escaped.contains("**") {
        escaped = escaped.replace("**", "*");
    }
    escaped.replace('*', ".*").replace('?', ".")
}

/// Evaluates queries against entries of a tree.
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    case_sensitive: bool,
}

impl SearchEngine {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.search_case_sensitive)
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn set_case_sensitive(&mut self, case_sensitive: bool) {
        self.case_sensitive = case_sensitive;
    }

    fn compile(&self, raw: &RawTerm) -> Result<SearchTerm, regex::Error> {
        let exact = raw.modifiers.contains('+');
        let mut pattern = if raw.modifiers.contains('*') {
            raw.word.clone()
        } else {
            wildcard_pattern(&raw.word)
        };
        if exact {
            pattern = format!("^(?:{pattern})$");
        }

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!self.case_sensitive)
            .build()?;

        Ok(SearchTerm {
            field: raw.field.as_deref().map(Field::parse).unwrap_or_default(),
            word: raw.word.clone(),
            exclude: raw.modifiers.contains('-'),
            exact,
            regex: Some(regex),
        })
    }

    /// Parse a query. A term whose pattern does not compile is kept but
    /// never matches.
    pub fn parse_terms(&self, query: &str) -> Vec<SearchTerm> {
        tokenize(query)
            .into_iter()
            .map(|raw| {
                self.compile(&raw).unwrap_or_else(|err| {
                    tracing::warn!(term = %raw.word, error = %err, "search term does not compile");
                    SearchTerm {
                        field: raw.field.as_deref().map(Field::parse).unwrap_or_default(),
                        word: raw.word.clone(),
                        exclude: raw.modifiers.contains('-'),
                        exact: raw.modifiers.contains('+'),
                        regex: None,
                    }
                })
            })
            .collect()
    }

    /// Parse a query, failing on the first term that does not compile.
    pub fn try_parse_terms(&self, query: &str) -> VaultResult<Vec<SearchTerm>> {
        tokenize(query)
            .iter()
            .map(|raw| {
                self.compile(raw).map_err(|source| VaultError::InvalidPattern {
                    term: raw.word.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Whether `entry` passes every term.
    pub fn matches(&self, terms: &[SearchTerm], entry: &Entry) -> bool {
        terms.iter().all(|term| term.matches(entry))
    }

    /// Entries of `entries` matching `query`, in order.
    pub fn search_entries(&self, query: &str, entries: &[Entry]) -> Vec<Entry> {
        let terms = self.parse_terms(query);
        entries
            .iter()
            .filter(|entry| self.matches(&terms, entry))
            .cloned()
            .collect()
    }

    /// Search the entries of `group` and of its immediate children.
    ///
    /// The start group is searched if its resolved searching flag allows it;
    /// a child is searched unless its own flag is `Disable`. Deeper groups are
    /// not visited.
    pub fn search(&self, query: &str, group: &Group) -> Vec<Entry> {
        let terms = self.parse_terms(query);
        let mut results = Vec::new();

        let mut collect = |entries: Vec<Entry>| {
            results.extend(entries.into_iter().filter(|e| self.matches(&terms, e)));
        };

        if group.resolve_searching_enabled() {
            collect(group.entries());
        }
        for child in group.children() {
            if child.searching_enabled() != TriState::Disable {
                collect(child.entries());
            }
        }

        tracing::debug!(query, group = %group.uuid(), results = results.len(), "search finished");
        results
    }
}
