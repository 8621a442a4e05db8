//! Settings shared by Novelist front ends: preferences and translation catalogs.

pub mod localization;
pub mod preferences;
pub mod storage;

pub use localization::{
    fill, LocalizationError, TsCatalog, Translator, CONTEXT_EDIT_LOG, CONTEXT_FIND_WIDGET,
    CONTEXT_PROJECT_MODEL, CONTEXT_STATS_DIALOG,
};
pub use preferences::{
    FindPreferences, HistoryPreferences, Preferences, PreferencesError, PreferencesStore,
    ScopePreference, StatsPreferences, UiPreferences,
};
