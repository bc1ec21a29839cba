//! Hosts-file editing for website blocking and safe search.
//!
//! The line functions are pure; [`HostsFile`] wraps them with reads and
//! writes of the real file. Writing usually needs administrator rights, and
//! a failed write is returned to the caller, which must then leave its
//! preference state untouched.

use crate::constants::{BLOCK_ADDRESS, SAFE_SEARCH_ENTRIES};
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

/// Hosts entries that block `domain` (and its `www.` form)
pub fn block_entries(domain: &str) -> Vec<String> {
    let domain = domain.trim().to_lowercase();
    let mut entries = vec![format!("{} {}", BLOCK_ADDRESS, domain)];
    if !domain.starts_with("www.") {
        entries.push(format!("{} www.{}", BLOCK_ADDRESS, domain));
    }
    entries
}

fn has_entry(content: &str, entry: &str) -> bool {
    let wanted: Vec<&str> = entry.split_whitespace().collect();
    content
        .lines()
        .any(|line| line.split_whitespace().collect::<Vec<_>>() == wanted)
}

/// Append the missing entries; returns the new content and how many were added
pub fn with_entries<S: AsRef<str>>(content: &str, entries: &[S]) -> (String, usize) {
    let mut updated = content.to_string();
    let mut added = 0;
    for entry in entries {
        let entry = entry.as_ref();
        if has_entry(&updated, entry) {
            continue;
        }
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push_str(LINE_ENDING);
        }
        updated.push_str(entry);
        updated.push_str(LINE_ENDING);
        added += 1;
    }
    (updated, added)
}

/// Drop every loopback line for `domain` or `www.domain`
pub fn without_domain(content: &str, domain: &str) -> String {
    let domain = domain.trim().to_lowercase();
    let bare = domain.strip_prefix("www.").unwrap_or(&domain).to_string();
    let www = format!("www.{}", bare);

    let kept: Vec<&str> = content
        .lines()
        .filter(|line| {
            let mut fields = line.split_whitespace();
            let blocks_domain = fields.next() == Some(BLOCK_ADDRESS)
                && fields.next().is_some_and(|host| {
                    let host = host.to_lowercase();
                    host == bare || host == www
                });
            !blocks_domain
        })
        .collect();

    let mut updated = kept.join(LINE_ENDING);
    if !updated.is_empty() {
        updated.push_str(LINE_ENDING);
    }
    updated
}

pub fn has_safe_search(content: &str) -> bool {
    SAFE_SEARCH_ENTRIES
        .iter()
        .all(|entry| has_entry(content, entry))
}

pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read hosts file: {}", self.path.display())),
        }
    }

    fn write(&self, content: &str) -> Result<()> {
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write hosts file: {}", self.path.display()))
    }

    /// Returns the number of entries added (zero if already blocked)
    pub fn block_domain(&self, domain: &str) -> Result<usize> {
        if domain.trim().is_empty() {
            anyhow::bail!("Invalid domain: '{}'", domain);
        }

        let (updated, added) = with_entries(&self.read()?, &block_entries(domain));
        if added > 0 {
            self.write(&updated)?;
            info!("Blocked {} in {}", domain, self.path.display());
        }
        Ok(added)
    }

    pub fn unblock_domain(&self, domain: &str) -> Result<()> {
        let content = self.read()?;
        let updated = without_domain(&content, domain);
        if updated != content {
            self.write(&updated)?;
            info!("Unblocked {} in {}", domain, self.path.display());
        }
        Ok(())
    }

    pub fn enforce_safe_search(&self) -> Result<usize> {
        let (updated, added) = with_entries(&self.read()?, SAFE_SEARCH_ENTRIES);
        if added > 0 {
            self.write(&updated)?;
            info!("Safe search enforced ({} entries added)", added);
        }
        Ok(added)
    }

    pub fn is_safe_search_enforced(&self) -> Result<bool> {
        Ok(has_safe_search(&self.read()?))
    }
}
