//! Persisted scalar preferences: theme and per-user speech output

use std::fmt;
use std::str::FromStr;

use super::{RecordKey, RecordStore};
use crate::Result;

/// UI color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    /// The other theme
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(()),
        }
    }
}

/// Preference records layered on the key-value store
#[derive(Clone)]
pub struct Preferences {
    store: RecordStore,
}

impl Preferences {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Whether speech output is enabled for `username`; off on first run
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub fn tts_enabled(&self, username: &str) -> Result<bool> {
        let saved = self.store.get(&RecordKey::TtsEnabled(username))?;
        Ok(saved.as_deref().and_then(|s| s.parse().ok()).unwrap_or(false))
    }

    /// Persist the speech output preference for `username`
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn set_tts_enabled(&self, username: &str, enabled: bool) -> Result<()> {
        self.store
            .set(&RecordKey::TtsEnabled(username), if enabled { "true" } else { "false" })
    }

    /// The saved theme; dark on first run
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub fn theme(&self) -> Result<Theme> {
        let saved = self.store.get(&RecordKey::Theme)?;
        Ok(saved
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default())
    }

    /// Persist the theme
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.store.set(&RecordKey::Theme, &theme.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    fn setup() -> Preferences {
        Preferences::new(open_memory().unwrap())
    }

    #[test]
    fn tts_defaults_off() {
        let prefs = setup();
        assert!(!prefs.tts_enabled("alice").unwrap());
    }

    #[test]
    fn tts_preference_is_per_user() {
        let prefs = setup();
        prefs.set_tts_enabled("alice", true).unwrap();

        assert!(prefs.tts_enabled("alice").unwrap());
        assert!(!prefs.tts_enabled("bob").unwrap());
    }

    #[test]
    fn theme_defaults_dark_and_round_trips() {
        let prefs = setup();
        assert_eq!(prefs.theme().unwrap(), Theme::Dark);

        prefs.set_theme(Theme::Light).unwrap();
        assert_eq!(prefs.theme().unwrap(), Theme::Light);
    }

    #[test]
    fn theme_toggles() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }
}
