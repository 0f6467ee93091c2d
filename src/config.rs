use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cycle::{default_study_days, DEFAULT_WEEKLY_QUESTIONS_GOAL};
use crate::error::Result;

pub const DB_ENV: &str = "STUDYCYCLE_DB";
pub const CONFIG_ENV: &str = "STUDYCYCLE_CONFIG";

const APP_DIR: &str = "studycycle";
const DEFAULT_DB_NAME: &str = "studycycle.db";
const DEFAULT_CONFIG_NAME: &str = "config.toml";

/// Defaults used by `cycle generate` when flags are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleDefaults {
    pub weekly_hours: u32,
    pub min_session_minutes: u32,
    pub max_session_minutes: u32,
    pub weekly_questions_goal: u32,
    pub study_days: Vec<Weekday>,
}

impl Default for CycleDefaults {
    fn default() -> Self {
        Self {
            weekly_hours: 40,
            min_session_minutes: 60,
            max_session_minutes: 120,
            weekly_questions_goal: DEFAULT_WEEKLY_QUESTIONS_GOAL,
            study_days: default_study_days(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub cycle: CycleDefaults,
}

impl Config {
    /// Load the config file if one exists. A missing file means defaults;
    /// a malformed one is an error.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Config = toml::from_str(&content)?;
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `STUDYCYCLE_DB` wins over the config file, which wins over the
    /// platform data location.
    pub fn db_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(DB_ENV) {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.db_path {
            return path.clone();
        }

        let dir = app_dir();
        ensure_dir(&dir);
        dir.join(DEFAULT_DB_NAME)
    }
}

/// Create `dir` and its parents, logging a failure.
fn ensure_dir(dir: &Path) -> bool {
    match fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "could not create data directory");
            false
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    app_dir().join(DEFAULT_CONFIG_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cycle.weekly_hours, 40);
        assert_eq!(config.cycle.min_session_minutes, 60);
        assert_eq!(config.cycle.max_session_minutes, 120);
        assert_eq!(config.cycle.weekly_questions_goal, 250);
        assert_eq!(config.cycle.study_days.len(), 5);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cycle]\nweekly_hours = 20").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.cycle.weekly_hours, 20);
        assert_eq!(config.cycle.min_session_minutes, 60);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn study_days_and_goal_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[cycle]\nweekly_questions_goal = 400\nstudy_days = [\"Sat\", \"Sun\"]"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.cycle.weekly_questions_goal, 400);
        assert_eq!(config.cycle.study_days, vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(config.cycle.weekly_hours, 40);
    }

    #[test]
    fn db_path_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_path = \"/tmp/plans.db\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/plans.db")));
    }

    #[test]
    fn env_var_overrides_db_path() {
        let config = Config {
            db_path: Some(PathBuf::from("/tmp/from-file.db")),
            ..Config::default()
        };

        std::env::set_var(DB_ENV, "/tmp/from-env.db");
        let path = config.db_path();
        std::env::remove_var(DB_ENV);

        assert_eq!(path, PathBuf::from("/tmp/from-env.db"));
    }

    #[test]
    fn ensure_dir_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        assert!(ensure_dir(&nested));
        assert!(nested.is_dir());
        // Already there
        assert!(ensure_dir(&nested));
    }

    #[test]
    fn ensure_dir_reports_failure_under_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "x").unwrap();

        assert!(!ensure_dir(&file.join("data")));
        assert!(!file.join("data").exists());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cycle\nweekly_hours = ").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }
}
