use std::{env, str::FromStr, time::Duration};

use peer_registry::{DiffStrategy, SessionConfig, SessionConfigBuilder, Shape};
use secrecy::Secret;

use crate::db::database_url_from_env;

pub const DEFAULT_TICK_MS: u64 = 16;
pub const DEFAULT_SHAPE: Shape = Shape {
    x: 0.0,
    y: 0.0,
    w: 800.0,
    h: 600.0,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

pub struct Settings {
    pub database: DatabaseSettings,
    pub peer: PeerSettings,
}

pub struct DatabaseSettings {
    pub url: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct PeerSettings {
    pub tick_ms: u64,
    /// Wipe the store and exit instead of joining.
    pub clear: bool,
    pub shape: Shape,
    pub diff: DiffStrategy,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            clear: false,
            shape: DEFAULT_SHAPE,
            diff: DiffStrategy::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, Error> {
        let url = database_url_from_env().map_err(|_| Error::Missing("DATABASE_URL"))?;
        Ok(Self {
            database: DatabaseSettings { url },
            peer: PeerSettings::from_env()?,
        })
    }
}

impl PeerSettings {
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        Ok(Self {
            tick_ms: parse_var("REGISTRY_TICK_MS", defaults.tick_ms)?,
            clear: flag_var("REGISTRY_CLEAR")?,
            shape: parse_var("REGISTRY_SHAPE", defaults.shape)?,
            diff: parse_var("REGISTRY_DIFF", defaults.diff)?,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfigBuilder::new()
            .tick_interval(Duration::from_millis(self.tick_ms))
            .diff(self.diff)
            .build()
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| Error::Invalid {
            name,
            source: e.into(),
        }),
        Err(_) => Ok(default),
    }
}

fn flag_var(name: &'static str) -> Result<bool, Error> {
    let Ok(raw) = env::var(name) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        other => Err(Error::Invalid {
            name,
            source: anyhow::anyhow!("'{other}' is not a boolean"),
        }),
    }
}
