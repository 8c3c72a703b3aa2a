//! Process-wide display and refresh settings.
//!
//! `SettingsStore` is the single owner of [`AppSettings`]. It is created once
//! at startup (loaded from the blob store or defaulted), handed to readers by
//! reference, and mutated only through [`SettingsStore::update`], which
//! persists before returning.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::{load_json, save_json, BlobStore, StorageError, SETTINGS_KEY};

/// Shortest auto-refresh period honoured, whatever the stored value says.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Theme
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Parse a variant name from a string (case-insensitive).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    /// Light → Dark → Light.
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

// ============================================================================
// AppSettings
// ============================================================================

/// Settings shared by every lane.
///
/// The persisted field names match the blob written by earlier releases
/// (`refreshInterval` in milliseconds); missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub theme: Theme,
    pub show_awards: bool,
    pub show_thumbnails: bool,
    pub compact_mode: bool,
    pub auto_refresh: bool,
    #[serde(rename = "refreshInterval", alias = "refreshIntervalMs")]
    pub refresh_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            show_awards: true,
            show_thumbnails: true,
            compact_mode: false,
            auto_refresh: false,
            refresh_interval_ms: 300_000, // 5 minutes
        }
    }
}

impl AppSettings {
    /// Auto-refresh period, floored at [`MIN_REFRESH_INTERVAL`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms).max(MIN_REFRESH_INTERVAL)
    }
}

/// Partial update: every `Some` field replaces the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub show_awards: Option<bool>,
    pub show_thumbnails: Option<bool>,
    pub compact_mode: Option<bool>,
    pub auto_refresh: Option<bool>,
    pub refresh_interval_ms: Option<u64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(v) = self.show_awards {
            settings.show_awards = v;
        }
        if let Some(v) = self.show_thumbnails {
            settings.show_thumbnails = v;
        }
        if let Some(v) = self.compact_mode {
            settings.compact_mode = v;
        }
        if let Some(v) = self.auto_refresh {
            settings.auto_refresh = v;
        }
        if let Some(v) = self.refresh_interval_ms {
            settings.refresh_interval_ms = v;
        }
    }
}

// ============================================================================
// SettingsStore
// ============================================================================

/// Owner of the live [`AppSettings`], persisted on every change.
pub struct SettingsStore {
    current: AppSettings,
    store: Arc<dyn BlobStore>,
}

impl SettingsStore {
    /// Load persisted settings, falling back to defaults when the blob is
    /// absent or malformed.
    pub fn load(store: Arc<dyn BlobStore>) -> Self {
        let current = load_json::<AppSettings>(store.as_ref(), SETTINGS_KEY).unwrap_or_default();
        tracing::debug!(?current, "Settings loaded");
        Self { current, store }
    }

    pub fn get(&self) -> &AppSettings {
        &self.current
    }

    /// Merge `patch` into the current settings and persist the result.
    ///
    /// The write happens before this returns. If it fails, the in-memory
    /// settings are left untouched and the error is returned.
    pub fn update(&mut self, patch: &SettingsPatch) -> Result<&AppSettings, StorageError> {
        let mut next = self.current.clone();
        patch.apply_to(&mut next);

        save_json(self.store.as_ref(), SETTINGS_KEY, &next)?;
        if next != self.current {
            tracing::info!(?patch, "Settings updated");
        }
        self.current = next;
        Ok(&self.current)
    }

    pub fn toggle_theme(&mut self) -> Result<Theme, StorageError> {
        let theme = self.current.theme.toggled();
        self.update(&SettingsPatch {
            theme: Some(theme),
            ..Default::default()
        })?;
        Ok(theme)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    impl BlobStore for ReadOnlyStore {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn test_defaults_when_nothing_persisted() {
        let settings = SettingsStore::load(Arc::new(MemoryStore::new()));
        let s = settings.get();
        assert_eq!(s.theme, Theme::Light);
        assert!(s.show_awards);
        assert!(s.show_thumbnails);
        assert!(!s.compact_mode);
        assert!(!s.auto_refresh);
        assert_eq!(s.refresh_interval_ms, 300_000);
    }

    #[test]
    fn test_defaults_when_blob_malformed() {
        let store = Arc::new(MemoryStore::new());
        store.write(SETTINGS_KEY, "not json at all").unwrap();

        let settings = SettingsStore::load(store);
        assert_eq!(settings.get(), &AppSettings::default());
    }

    #[test]
    fn test_loads_legacy_blob_field_names() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(
                SETTINGS_KEY,
                r#"{"theme":"dark","showAwards":false,"showThumbnails":true,"compactMode":true,"autoRefresh":true,"refreshInterval":60000}"#,
            )
            .unwrap();

        let settings = SettingsStore::load(store);
        let s = settings.get();
        assert_eq!(s.theme, Theme::Dark);
        assert!(!s.show_awards);
        assert!(s.compact_mode);
        assert!(s.auto_refresh);
        assert_eq!(s.refresh_interval_ms, 60_000);
    }

    #[test]
    fn test_partial_blob_fills_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.write(SETTINGS_KEY, r#"{"theme":"dark"}"#).unwrap();

        let settings = SettingsStore::load(store);
        assert_eq!(settings.get().theme, Theme::Dark);
        assert!(settings.get().show_thumbnails);
    }

    #[test]
    fn test_update_merges_and_persists_immediately() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = SettingsStore::load(store.clone());

        settings
            .update(&SettingsPatch {
                auto_refresh: Some(true),
                refresh_interval_ms: Some(10_000),
                ..Default::default()
            })
            .unwrap();

        assert!(settings.get().auto_refresh);
        assert_eq!(settings.get().theme, Theme::Light, "untouched fields kept");

        // A fresh store sees the persisted value
        let reloaded = SettingsStore::load(store);
        assert_eq!(reloaded.get(), settings.get());
    }

    #[test]
    fn test_toggle_theme_flips_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = SettingsStore::load(store.clone());

        assert_eq!(settings.toggle_theme().unwrap(), Theme::Dark);
        assert_eq!(SettingsStore::load(store.clone()).get().theme, Theme::Dark);
        assert_eq!(settings.toggle_theme().unwrap(), Theme::Light);
    }

    #[test]
    fn test_failed_persist_leaves_settings_unchanged() {
        let mut settings = SettingsStore::load(Arc::new(ReadOnlyStore));

        let result = settings.update(&SettingsPatch {
            compact_mode: Some(true),
            ..Default::default()
        });

        assert!(result.is_err());
        assert!(!settings.get().compact_mode);
    }

    #[test]
    fn test_refresh_interval_is_floored() {
        let settings = AppSettings {
            refresh_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(settings.refresh_interval(), MIN_REFRESH_INTERVAL);

        let settings = AppSettings {
            refresh_interval_ms: 30_000,
            ..Default::default()
        };
        assert_eq!(settings.refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_blob_uses_camel_case_names() {
        let json = serde_json::to_value(AppSettings::default()).unwrap();
        assert_eq!(json["refreshInterval"], 300_000);
        assert_eq!(json["showThumbnails"], true);
        assert_eq!(json["theme"], "light");
    }

    #[test]
    fn test_empty_patch() {
        assert!(SettingsPatch::default().is_empty());
        assert!(!SettingsPatch {
            theme: Some(Theme::Dark),
            ..Default::default()
        }
        .is_empty());
    }
}
