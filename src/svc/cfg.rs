//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Aws structure

/// aws client settings, everything not given here is resolved through the
/// usual aws credentials and profile chain
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Aws {
    /// region in which database instances are created
    #[serde(rename = "region", default)]
    pub region: Option<String>,
    /// endpoint override, mostly useful to target a local rds stand-in
    #[serde(rename = "endpoint", default)]
    pub endpoint: Option<String>,
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to load configuration, {0}")]
    Build(ConfigError),
    #[error("failed to deserialize configuration, {0}")]
    Cast(ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Configuration {
    #[serde(rename = "aws", default)]
    pub aws: Aws,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = Error;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_"))
                    .separator("__"),
            )
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

impl Configuration {
    /// try to load the configuration from defaults paths and environment
    pub fn try_default() -> Result<Self, Error> {
        let paths = [
            PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!(
                "{}/.config/{}/config",
                env!("HOME"),
                env!("CARGO_PKG_NAME")
            )),
            PathBuf::from(format!(
                "{}/.local/share/{}/config",
                env!("HOME"),
                env!("CARGO_PKG_NAME")
            )),
            PathBuf::from("config"),
        ];

        let mut builder = Config::builder();
        for path in paths {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_"))
                    .separator("__"),
            )
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}
