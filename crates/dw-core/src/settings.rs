use serde::{Deserialize, Serialize};

use crate::util::parse_bool_flag;
use crate::DomainError;

/// Metadata key holding the serialized current week.
pub const META_CURRENT_WEEK: &str = "current_week";
/// Metadata key holding the [`Settings`] blob.
pub const META_SETTINGS: &str = "dw_settings";
/// Metadata key holding the persisted client filter (`string | null`).
pub const META_FILTER_CLIENT: &str = "dw_filterCliente";
/// Metadata key holding the client registry (JSON array of names).
pub const META_CLIENTS: &str = "dw_clients";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
}

fn default_auto_advance() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_advance: default_auto_advance(),
        }
    }
}

impl Settings {
    /// Parse the stored blob; anything unreadable falls back to defaults.
    pub fn from_meta(raw: Option<&str>) -> Self {
        match raw {
            Some(s) => serde_json::from_str(s).unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring unreadable settings blob");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn to_meta(&self) -> String {
        serde_json::json!({ "autoAdvance": self.auto_advance }).to_string()
    }

    /// Set one setting from its textual form. Keys accept camelCase,
    /// snake_case and kebab-case spellings.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), DomainError> {
        match key.trim() {
            "autoAdvance" | "auto_advance" | "auto-advance" => {
                self.auto_advance = parse_bool_flag(value).ok_or_else(|| {
                    DomainError::InvalidSetting {
                        key: key.to_string(),
                        value: value.to_string(),
                    }
                })?;
                Ok(())
            }
            other => Err(DomainError::UnknownSetting(other.to_string())),
        }
    }
}
