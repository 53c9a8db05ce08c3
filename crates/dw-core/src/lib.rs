//! Domain model for the weekly demand tracker: demands, week periods,
//! settings, the rollover decision, and configuration loading.

mod config;
mod demand;
pub mod rollover;
mod settings;
pub mod util;
mod week;

pub use config::{
    config_schema_json, default_state_dir, load_config, load_effective_config, parse_config,
    resolve_config_path, Config, EffectiveConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DB_FILE,
    DEFAULT_TICK_SECS,
};
pub use demand::{Demand, DemandChanges, NewDemand, Priority, Status};
pub use rollover::RolloverDecision;
pub use settings::{
    Settings, META_CLIENTS, META_CURRENT_WEEK, META_FILTER_CLIENT, META_SETTINGS,
};
pub use week::{week_key, Week};

/// Validation errors raised by domain types.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("unknown priority '{0}' (expected low|medium|high)")]
    UnknownPriority(String),
    #[error("unknown status '{0}' (expected open|done|urgent)")]
    UnknownStatus(String),
    #[error("invalid week: {0}")]
    InvalidWeek(String),
    #[error("cannot move a demand from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },
    #[error("unknown setting '{0}'")]
    UnknownSetting(String),
    #[error("invalid value '{value}' for setting '{key}'")]
    InvalidSetting { key: String, value: String },
}
