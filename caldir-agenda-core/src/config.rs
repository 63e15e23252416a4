//! Agenda configuration.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::constants::DEFAULT_AGENDA_DAYS;
use crate::error::{AgendaError, AgendaResult};
use crate::filter::FilterMode;

static DEFAULT_CALDIR_PATH: &str = "~/calendar";

fn default_caldir_path() -> PathBuf {
    PathBuf::from(DEFAULT_CALDIR_PATH)
}

fn default_days() -> i64 {
    DEFAULT_AGENDA_DAYS
}

/// Configuration at ~/.config/caldir/config.toml
///
/// ```toml
/// calendar_dir = "~/calendar"
///
/// [agenda]
/// days = 7
/// filters = ["one-per-calendar"]
/// ```
///
/// Every key can be overridden from the environment, e.g.
/// `CALDIR_CALENDAR_DIR` or `CALDIR_AGENDA__DAYS`.
#[derive(Deserialize, Clone, Debug)]
pub struct AgendaConfig {
    #[serde(default = "default_caldir_path")]
    pub calendar_dir: PathBuf,

    #[serde(default)]
    pub agenda: AgendaSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AgendaSettings {
    /// Days shown when no end date is given
    #[serde(default = "default_days")]
    pub days: i64,

    #[serde(default)]
    pub filters: FilterMode,
}

impl Default for AgendaSettings {
    fn default() -> Self {
        AgendaSettings {
            days: default_days(),
            filters: FilterMode::NONE,
        }
    }
}

impl Default for AgendaConfig {
    fn default() -> Self {
        AgendaConfig {
            calendar_dir: default_caldir_path(),
            agenda: AgendaSettings::default(),
        }
    }
}

impl AgendaConfig {
    pub fn config_path() -> AgendaResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AgendaError::Config("Could not determine config directory".into()))?
            .join("caldir");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> AgendaResult<Self> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> AgendaResult<Self> {
        let config: AgendaConfig = Config::builder()
            .add_source(File::from(path.into()).required(false))
            .add_source(
                Environment::with_prefix("CALDIR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("agenda.filters")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AgendaError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AgendaError::Config(e.to_string()))?;

        if config.agenda.days < 1 {
            return Err(AgendaError::Config(format!(
                "agenda.days must be at least 1, got {}",
                config.agenda.days
            )));
        }

        Ok(config)
    }

    /// Calendar directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str =
            shellexpand::tilde(&self.calendar_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }
}
