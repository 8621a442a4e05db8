//! Versioned user preferences for Novelist front ends.
//! Novelist 前端的使用者偏好設定（含版本號）。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::write_atomic;

const CURRENT_VERSION: u32 = 1;
const DEFAULT_LOCALE: &str = "en-US";
const DEFAULT_UNDO_LIMIT: usize = 100;
const MAX_UNDO_LIMIT: usize = 10_000;
const DEFAULT_SNAPSHOT_INTERVAL_MINUTES: u64 = 30;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("cannot access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("preferences at {path} are not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PreferencesError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Root preference document. Absent sections and fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub version: u32,
    pub ui: UiPreferences,
    pub history: HistoryPreferences,
    pub find: FindPreferences,
    pub stats: StatsPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            ui: UiPreferences::default(),
            history: HistoryPreferences::default(),
            find: FindPreferences::default(),
            stats: StatsPreferences::default(),
        }
    }
}

impl Preferences {
    /// Brings legacy or hand-edited values back into range.
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CURRENT_VERSION;
        }
        if self.ui.locale.trim().is_empty() {
            self.ui.locale = DEFAULT_LOCALE.to_string();
        }
        self.history.undo_limit = match self.history.undo_limit {
            0 => DEFAULT_UNDO_LIMIT,
            limit => limit.min(MAX_UNDO_LIMIT),
        };
    }

    fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    /// BCP-47 style tag, e.g. `de-DE`; selects the built-in catalog.
    pub locale: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

/// Undo history limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryPreferences {
    pub undo_limit: usize,
}

impl Default for HistoryPreferences {
    fn default() -> Self {
        Self {
            undo_limit: DEFAULT_UNDO_LIMIT,
        }
    }
}

/// Search scope remembered between find sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopePreference {
    Scene,
    Chapter,
    #[default]
    Project,
}

/// Initial state of the find/replace panel toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FindPreferences {
    pub match_case: bool,
    pub regex: bool,
    pub search_titles: bool,
    pub scope: ScopePreference,
}

/// How often statistics snapshots are taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsPreferences {
    pub snapshot_interval_minutes: u64,
}

impl Default for StatsPreferences {
    fn default() -> Self {
        Self {
            snapshot_interval_minutes: DEFAULT_SNAPSHOT_INTERVAL_MINUTES,
        }
    }
}

impl StatsPreferences {
    pub fn snapshot_interval_secs(&self) -> u64 {
        self.snapshot_interval_minutes.saturating_mul(60)
    }
}

/// Preferences bound to the JSON file they were read from.
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    current: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            current: preferences.sanitized(),
        }
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref();
        let current = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<Preferences>(&raw)
                .map_err(PreferencesError::json(path))?
                .sanitized(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Preferences::default(),
            Err(err) => return Err(PreferencesError::io(path)(err)),
        };
        log::debug!("preferences loaded from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            current,
        })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.current
    }

    /// Applies `edit`, re-sanitizes and writes the file.
    pub fn update(&mut self, edit: impl FnOnce(&mut Preferences)) -> Result<(), PreferencesError> {
        edit(&mut self.current);
        self.current.sanitize();
        self.save()
    }

    /// Writes the file atomically, creating its directory when needed.
    pub fn save(&self) -> Result<(), PreferencesError> {
        let json =
            serde_json::to_vec_pretty(&self.current).map_err(PreferencesError::json(&self.path))?;
        write_atomic(&self.path, &json).map_err(PreferencesError::io(&self.path))?;
        log::debug!("preferences saved to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
