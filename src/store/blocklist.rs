//! Block-list mutations.
//!
//! Adding to a block list is immediate. Removing is only allowed once the
//! item's deletion timer has expired and put it on the matching
//! `allowedForUnblock*` list.

use super::{normalize_process_name, BlockedApp, Category, Store};
use anyhow::{Context, Result};
use log::{info, warn};

impl Store {
    pub fn blocked_apps(&self) -> Vec<BlockedApp> {
        self.read_block_data().blocked_apps
    }

    /// Returns false if an app with the same process name is already blocked
    pub fn add_blocked_app(&self, app: BlockedApp) -> Result<bool> {
        let key = app.normalized_process_name();
        let added = self
            .update_block_data(|data| {
                if data
                    .blocked_apps
                    .iter()
                    .any(|a| a.normalized_process_name() == key)
                {
                    return false;
                }
                data.blocked_apps.push(app.clone());
                true
            })
            .context("Failed to save blocked app")?;

        if added {
            info!("Blocked app {} ({})", app.display_name, app.process_name);
        }
        Ok(added)
    }

    pub fn add_blocked_website(&self, domain: &str) -> Result<bool> {
        let domain = domain.trim().to_lowercase();
        self.update_block_data(|data| {
            if data.blocked_websites.contains(&domain) {
                return false;
            }
            data.blocked_websites.push(domain.clone());
            true
        })
        .context("Failed to save blocked website")
    }

    /// Remove a blocked app whose deletion delay has elapsed
    pub fn remove_blocked_app(&self, process_name: &str) -> Result<bool> {
        let key = normalize_process_name(process_name);
        let removed = self
            .update_block_data(|data| {
                let allowed_at = data
                    .allowed_for_unblock_apps
                    .iter()
                    .position(|item| normalize_process_name(item) == key);
                let Some(allowed_at) = allowed_at else {
                    return false;
                };

                data.allowed_for_unblock_apps.remove(allowed_at);
                let before = data.blocked_apps.len();
                data.blocked_apps
                    .retain(|a| a.normalized_process_name() != key);
                before != data.blocked_apps.len()
            })
            .context("Failed to save block list")?;

        if !removed {
            warn!(
                "Refusing to unblock {}: deletion delay has not elapsed",
                process_name
            );
        }
        Ok(removed)
    }

    /// Remove a blocked website whose deletion delay has elapsed
    pub fn remove_blocked_website(&self, domain: &str) -> Result<bool> {
        let domain = domain.trim().to_lowercase();
        let removed = self
            .update_block_data(|data| {
                let Some(allowed_at) = data
                    .allowed_for_unblock_websites
                    .iter()
                    .position(|item| item.eq_ignore_ascii_case(&domain))
                else {
                    return false;
                };

                data.allowed_for_unblock_websites.remove(allowed_at);
                let before = data.blocked_websites.len();
                data.blocked_websites.retain(|d| d != &domain);
                before != data.blocked_websites.len()
            })
            .context("Failed to save block list")?;

        if !removed {
            warn!("Refusing to unblock {}: deletion delay has not elapsed", domain);
        }
        Ok(removed)
    }

    /// Mark an item as eligible for removal (no duplicates)
    pub fn allow_for_unblock(&self, category: Category, item: &str) -> Result<()> {
        self.update_block_data(|data| {
            let list = data.allowed_for_unblock_mut(category);
            if !list.iter().any(|existing| existing == item) {
                list.push(item.to_string());
            }
        })
        .with_context(|| format!("Failed to allow '{}' for unblocking", item))
    }
}
