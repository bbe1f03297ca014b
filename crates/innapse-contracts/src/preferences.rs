use std::env;
use std::fmt;
use std::str::FromStr;

use crate::storage::LocalStorage;

pub const THEME_STORAGE_KEY: &str = "innapse-theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    /// Theme used when nothing valid is stored. `INNAPSE_THEME` wins, then
    /// the terminal background hint in `COLORFGBG`.
    pub fn detect_default() -> Self {
        if let Some(theme) = env::var("INNAPSE_THEME")
            .ok()
            .and_then(|value| value.parse::<Theme>().ok())
        {
            return theme;
        }
        env::var("COLORFGBG")
            .ok()
            .map(|value| theme_from_colorfgbg(&value))
            .unwrap_or_default()
    }

    pub fn load(storage: &mut LocalStorage, fallback: Theme) -> Self {
        storage
            .get_item(THEME_STORAGE_KEY)
            .and_then(|value| value.parse::<Theme>().ok())
            .unwrap_or(fallback)
    }

    pub fn save(self, storage: &mut LocalStorage) -> anyhow::Result<()> {
        storage.set_item(THEME_STORAGE_KEY, self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("Unknown theme '{other}'. Expected light or dark.")),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// COLORFGBG is "fg;bg" (sometimes "fg;default;bg"); bg 0-6 and 8 are dark.
fn theme_from_colorfgbg(raw: &str) -> Theme {
    let background = raw
        .rsplit(';')
        .next()
        .and_then(|value| value.trim().parse::<u8>().ok());
    match background {
        Some(0..=6) | Some(8) => Theme::Dark,
        _ => Theme::Light,
    }
}
