use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::uow::ExecutionMode;

pub const HOME_ENV: &str = "GYMLEDGER_HOME";
pub const MODE_ENV: &str = "GYMLEDGER_MODE";
const DEFAULT_LOG_FILTER: &str = "gymledger=warn";

/// How the deployment wants multi-step writes executed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ModePreference {
    /// Use atomic scopes when the store supports them, otherwise fall back with a warning.
    #[default]
    Auto,
    /// Refuse to start without atomic scopes.
    Atomic,
    /// Always run steps one by one.
    Sequential,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub home: PathBuf,
    pub mode: ModePreference,
}

impl Settings {
    pub fn resolve(home: Option<PathBuf>, mode: ModePreference) -> Result<Self, AppError> {
        let home = match home {
            Some(home) => home,
            None => default_home()?,
        };
        Ok(Self { home, mode })
    }

    pub fn db_path(&self) -> PathBuf {
        crate::db::resolve_db_path(&self.home)
    }
}

fn default_home() -> Result<PathBuf, AppError> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Ok(Path::new(&home).join(".gymledger"));
        }
    }
    Err(AppError::Validation(format!(
        "unable to resolve data directory; pass --home or set {HOME_ENV}"
    )))
}

/// Decides the execution mode once per process from the preference and the probed capability.
pub fn decide_mode(preference: ModePreference, atomic_supported: bool) -> Result<ExecutionMode, AppError> {
    match (preference, atomic_supported) {
        (ModePreference::Sequential, _) => Ok(ExecutionMode::Sequential),
        (_, true) => Ok(ExecutionMode::Atomic),
        (ModePreference::Atomic, false) => Err(AppError::Validation(
            "store does not support atomic scopes and --mode atomic was requested".to_string(),
        )),
        (ModePreference::Auto, false) => {
            tracing::warn!(
                "store does not support atomic scopes; running in sequential mode without rollback"
            );
            Ok(ExecutionMode::Sequential)
        }
    }
}

pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prefers_atomic_when_supported() {
        let mode = decide_mode(ModePreference::Auto, true).expect("mode");
        assert_eq!(mode, ExecutionMode::Atomic);
    }

    #[test]
    fn auto_degrades_when_unsupported() {
        let mode = decide_mode(ModePreference::Auto, false).expect("mode");
        assert_eq!(mode, ExecutionMode::Sequential);
    }

    #[test]
    fn atomic_requirement_fails_without_support() {
        let err = decide_mode(ModePreference::Atomic, false).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn sequential_is_forced_even_when_supported() {
        let mode = decide_mode(ModePreference::Sequential, true).expect("mode");
        assert_eq!(mode, ExecutionMode::Sequential);
    }

    #[test]
    fn explicit_home_wins() {
        let settings =
            Settings::resolve(Some(PathBuf::from("/tmp/gym")), ModePreference::Auto).expect("settings");
        assert_eq!(settings.db_path(), PathBuf::from("/tmp/gym/gymledger.db"));
    }
}
