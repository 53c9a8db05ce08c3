use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::util::{env_bool, env_string, env_u64};

pub const DEFAULT_DB_FILE: &str = "demandworker.sqlite";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_TICK_SECS: u64 = 60;

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StoreConfig {
    /// Directory holding the database file (defaults to the per-user data dir)
    #[serde(default)]
    pub state_dir: Option<String>,
    /// Database file name inside `state_dir`
    #[serde(default)]
    pub file_name: Option<String>,
    /// SQLite busy timeout in milliseconds
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RolloverConfig {
    /// Seed for the `autoAdvance` setting on a fresh store
    #[serde(default)]
    pub auto_advance: Option<bool>,
    /// Seconds between automatic week checks in watch mode
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct LogConfig {
    /// Default tracing filter when RUST_LOG is unset (e.g. "info", "dw_store=debug")
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rollover: RolloverConfig,
    #[serde(default)]
    pub log: LogConfig,
}

static CONFIG_SCHEMA: Lazy<Option<Validator>> = Lazy::new(|| {
    let schema_value = serde_json::to_value(schemars::schema_for!(Config)).ok()?;
    validator_for(&schema_value).ok()
});

/// Returns the JSON schema describing the configuration structure.
pub fn config_schema_json() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
}

/// Load and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("invalid config {}", path.display()))
}

/// Parse and validate TOML config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    if let Some(validator) = CONFIG_SCHEMA.as_ref() {
        let validation_errors: Vec<_> = validator
            .iter_errors(&json_value)
            .map(|e| e.to_string())
            .collect();
        if !validation_errors.is_empty() {
            return Err(anyhow::anyhow!(validation_errors.join(", ")));
        }
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

/// Fully resolved settings after config file and environment overlays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub state_dir: PathBuf,
    pub db_path: PathBuf,
    pub busy_timeout_ms: u64,
    pub auto_advance_default: bool,
    pub tick_secs: u64,
    pub log_level: String,
    pub config_path: Option<PathBuf>,
}

impl EffectiveConfig {
    /// Overlay environment variables on top of `cfg`.
    ///
    /// `DW_STATE_DIR`, `DW_SQLITE_BUSY_MS`, `DW_AUTO_ADVANCE` and
    /// `DW_TICK_SECS` take precedence over the file.
    pub fn resolve(cfg: &Config, config_path: Option<PathBuf>) -> Self {
        let state_dir = env_string("DW_STATE_DIR")
            .or_else(|| cfg.store.state_dir.clone())
            .map(|s| PathBuf::from(expand_vars(&s)))
            .unwrap_or_else(default_state_dir);
        let file_name = cfg
            .store
            .file_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_FILE.to_string());
        let busy_timeout_ms = env_u64("DW_SQLITE_BUSY_MS")
            .or(cfg.store.busy_timeout_ms)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
        let auto_advance_default = env_bool("DW_AUTO_ADVANCE")
            .or(cfg.rollover.auto_advance)
            .unwrap_or(true);
        let tick_secs = env_u64("DW_TICK_SECS")
            .or(cfg.rollover.interval_secs)
            .unwrap_or(DEFAULT_TICK_SECS)
            .max(1);
        let log_level = cfg
            .log
            .level
            .clone()
            .unwrap_or_else(|| "info".to_string());
        Self {
            db_path: state_dir.join(file_name),
            state_dir,
            busy_timeout_ms,
            auto_advance_default,
            tick_secs,
            log_level,
            config_path,
        }
    }
}

/// Load the effective configuration.
///
/// An explicit `path` must exist and parse. Otherwise `DW_CONFIG` or
/// `configs/default.toml` (see [`resolve_config_path`]) is used when present;
/// a broken discovered file is logged and ignored.
pub fn load_effective_config(path: Option<&Path>) -> Result<EffectiveConfig> {
    if let Some(p) = path {
        let cfg = load_config(p)?;
        return Ok(EffectiveConfig::resolve(&cfg, Some(p.to_path_buf())));
    }
    let discovered = env_string("DW_CONFIG")
        .map(PathBuf::from)
        .or_else(|| resolve_config_path("configs/default.toml"));
    let cfg = match discovered.as_deref() {
        Some(p) => match load_config(p) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                tracing::error!("{e:#}");
                None
            }
        },
        None => None,
    };
    let used = cfg.as_ref().and(discovered);
    Ok(EffectiveConfig::resolve(
        &cfg.unwrap_or_default(),
        used,
    ))
}

/// Per-user data directory, falling back to the working directory.
pub fn default_state_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "demandworker", "demandworker")
        .map(|p| p.data_local_dir().to_path_buf())
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".demandworker")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Very small %VAR% and $VAR expansion for portability.
fn expand_vars(raw: &str) -> String {
    let mut s = raw.to_string();
    for (k, v) in std::env::vars() {
        let p1 = format!("%{}%", k);
        let p2 = format!("${}", k);
        if s.contains(&p1) {
            s = s.replace(&p1, &v);
        }
        if s.contains(&p2) {
            s = s.replace(&p2, &v);
        }
    }
    s.replace('\\', "/")
}

/// Resolve a config file path independent of the current working directory.
///
/// Search order (first existing wins):
/// - `DW_CONFIG_DIR` environment variable if set (joined with `rel`)
/// - Directory of the current executable and its parent (joined with `rel`)
/// - Current working directory (joined with `rel`)
///
/// If `rel` is absolute, it is returned if it exists.
pub fn resolve_config_path(rel: &str) -> Option<PathBuf> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return rel_path.exists().then(|| rel_path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(cfg_dir) = env_string("DW_CONFIG_DIR") {
        candidates.push(PathBuf::from(cfg_dir));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.to_path_buf());
            if let Some(parent) = exe_dir.parent() {
                candidates.push(parent.to_path_buf());
            }
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }

    candidates
        .into_iter()
        .map(|base| base.join(rel))
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "DW_STATE_DIR",
            "DW_SQLITE_BUSY_MS",
            "DW_AUTO_ADVANCE",
            "DW_TICK_SECS",
            "DW_CONFIG",
            "DW_CONFIG_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn parses_sections() {
        let cfg = parse_config(
            r#"
            [store]
            state_dir = "/tmp/dw"
            file_name = "work.sqlite"
            busy_timeout_ms = 250

            [rollover]
            auto_advance = false
            interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.store.file_name.as_deref(), Some("work.sqlite"));
        assert_eq!(cfg.rollover.interval_secs, Some(5));
        assert_eq!(cfg.rollover.auto_advance, Some(false));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = parse_config("[rollover]\nauto_advance = \"sometimes\"\n").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn schema_mentions_sections() {
        let schema = config_schema_json();
        let props = &schema["properties"];
        assert!(props.get("store").is_some());
        assert!(props.get("rollover").is_some());
    }

    #[test]
    #[serial]
    fn env_overrides_file_values() {
        clear_env();
        let cfg = parse_config("[store]\nstate_dir = \"/tmp/from-file\"\nbusy_timeout_ms = 10\n").unwrap();
        let eff = EffectiveConfig::resolve(&cfg, None);
        assert_eq!(eff.state_dir, PathBuf::from("/tmp/from-file"));
        assert_eq!(eff.db_path, PathBuf::from("/tmp/from-file").join(DEFAULT_DB_FILE));
        assert_eq!(eff.busy_timeout_ms, 10);
        assert!(eff.auto_advance_default);
        assert_eq!(eff.tick_secs, DEFAULT_TICK_SECS);

        std::env::set_var("DW_STATE_DIR", "/tmp/from-env");
        std::env::set_var("DW_AUTO_ADVANCE", "off");
        std::env::set_var("DW_TICK_SECS", "0");
        let eff = EffectiveConfig::resolve(&cfg, None);
        assert_eq!(eff.state_dir, PathBuf::from("/tmp/from-env"));
        assert!(!eff.auto_advance_default);
        assert_eq!(eff.tick_secs, 1);
        clear_env();
    }

    #[test]
    #[serial]
    fn explicit_config_path_must_parse() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dw.toml");
        std::fs::write(&path, "[log]\nlevel = \"debug\"\n").unwrap();
        let eff = load_effective_config(Some(&path)).unwrap();
        assert_eq!(eff.log_level, "debug");
        assert_eq!(eff.config_path.as_deref(), Some(path.as_path()));

        std::fs::write(&path, "[log\n").unwrap();
        assert!(load_effective_config(Some(&path)).is_err());
    }
}
