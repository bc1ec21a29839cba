use crate::constants::{DELAY_TIMEOUT_KEY, SETTING_ID_DELIMITER};
use crate::store::Category;
use std::fmt;

/// What a timer id refers to, and therefore what its expiry commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingKey {
    /// `delayTimeout`: adopt the requested delay
    DelayTimeout,
    /// `<category>--><item>`: the item becomes eligible for removal
    AllowListing { category: Category, item: String },
    /// Any other id is a boolean protection that gets switched off
    Toggle(String),
}

impl SettingKey {
    pub fn parse(setting_id: &str) -> Self {
        if setting_id == DELAY_TIMEOUT_KEY {
            return SettingKey::DelayTimeout;
        }

        match setting_id.split_once(SETTING_ID_DELIMITER) {
            Some((prefix, item)) => SettingKey::AllowListing {
                category: Category::from_prefix(prefix),
                item: item.to_string(),
            },
            None => SettingKey::Toggle(setting_id.to_string()),
        }
    }

    /// Timer id for an allow-listing (deletion grace) timer
    pub fn allow_listing_id(category: Category, item: &str) -> String {
        format!("{}{}{}", category.as_prefix(), SETTING_ID_DELIMITER, item)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKey::DelayTimeout => f.write_str(DELAY_TIMEOUT_KEY),
            SettingKey::AllowListing { category, item } => {
                write!(f, "{}{}{}", category.as_prefix(), SETTING_ID_DELIMITER, item)
            }
            SettingKey::Toggle(name) => f.write_str(name),
        }
    }
}
