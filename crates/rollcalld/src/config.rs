use anyhow::Context;
use rollcall_core::{AbsentPolicy, MatchPolicy, Settings};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration: an optional TOML file (`ROLLCALL_CONFIG`) with
/// `ROLLCALL_*` environment variables layered on top.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Whether registrations and attendance runs are written to `db_path`.
    pub persist: bool,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
    /// Matching tolerance and ledger policies.
    pub settings: Settings,
}

/// Shape of the optional TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    persist: Option<bool>,
    session_bus: Option<bool>,
    tolerance: Option<f64>,
    match_policy: Option<MatchPolicy>,
    absent_policy: Option<AbsentPolicy>,
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (if set) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let file = match lookup("ROLLCALL_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, lookup))
    }

    fn resolve(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();

        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = lookup("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("attendance.db"));

        let tolerance = env_parsed(&lookup, "ROLLCALL_TOLERANCE")
            .or(file.tolerance)
            .unwrap_or(defaults.tolerance);
        let tolerance = if tolerance.is_finite() && tolerance > 0.0 {
            tolerance
        } else {
            tracing::warn!(tolerance, default = defaults.tolerance, "invalid tolerance; using default");
            defaults.tolerance
        };

        let match_policy = env_policy(&lookup, "ROLLCALL_MATCH_POLICY", MatchPolicy::parse)
            .or(file.match_policy)
            .unwrap_or(defaults.match_policy);
        let absent_policy = env_policy(&lookup, "ROLLCALL_ABSENT_POLICY", AbsentPolicy::parse)
            .or(file.absent_policy)
            .unwrap_or(defaults.absent_policy);

        Self {
            db_path,
            persist: env_flag(&lookup, "ROLLCALL_PERSIST")
                .or(file.persist)
                .unwrap_or(true),
            session_bus: env_flag(&lookup, "ROLLCALL_SESSION_BUS")
                .or(file.session_bus)
                .unwrap_or(false),
            settings: Settings {
                tolerance,
                match_policy,
                absent_policy,
            },
        }
    }
}

fn read_file(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn env_parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable value");
            None
        }
    }
}

fn env_policy<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unknown policy");
    }
    parsed
}

fn env_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    lookup(key).map(|v| v.trim() != "0")
}
