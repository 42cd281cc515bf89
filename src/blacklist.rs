//! Port blacklist collaborator.
//!
//! The registry only asks a [`Blacklist`] whether a port identifier is
//! rejected. Where the entries come from (config file, CLI) is up to the caller.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Characters that turn a blacklist entry into a regular expression.
const REGEX_META: &[char] = &['[', ']', '{', '}', '(', ')', '*', '+', '?', '|', '^', '$', '\\', '.'];

pub trait Blacklist: Send + Sync {
    /// True if `port` must be hidden from enumeration and refused on open.
    fn is_blacklisted(&self, port: &str) -> bool;
}

/// Accepts every port.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBlacklist;

impl Blacklist for NoBlacklist {
    fn is_blacklisted(&self, _port: &str) -> bool {
        false
    }
}

/// Exact names plus regular expressions.
///
/// An entry containing any regex metacharacter is compiled as a pattern and
/// matched anywhere in the port name; other entries must match exactly.
/// Entries that fail to compile are logged and skipped.
#[derive(Debug, Default, Clone)]
pub struct PatternBlacklist {
    exact: HashSet<String>,
    patterns: Vec<Regex>,
}

impl PatternBlacklist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blacklist = Self::default();
        for entry in entries {
            blacklist.add(entry.as_ref());
        }
        blacklist
    }

    /// Add one entry. Blank lines and `#` comments are ignored.
    pub fn add(&mut self, entry: &str) {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            return;
        }
        if entry.contains(REGEX_META) {
            match Regex::new(entry) {
                Ok(re) => {
                    debug!("Added blacklist pattern: {}", entry);
                    self.patterns.push(re);
                }
                Err(e) => warn!("Ignoring invalid blacklist pattern '{}': {}", entry, e),
            }
        } else {
            debug!("Added blacklist entry: {}", entry);
            self.exact.insert(entry.to_string());
        }
    }

    /// Add every line of a blacklist file (one entry per line).
    ///
    /// Returns the number of rules held afterwards.
    pub fn extend_from_file(&mut self, path: &Path) -> std::io::Result<usize> {
        let content = std::fs::read_to_string(path)?;
        for line in content.lines() {
            self.add(line);
        }
        info!("Loaded blacklist {}, {} rule(s)", path.display(), self.len());
        Ok(self.len())
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Blacklist for PatternBlacklist {
    fn is_blacklisted(&self, port: &str) -> bool {
        self.exact.contains(port) || self.patterns.iter().any(|re| re.is_match(port))
    }
}
