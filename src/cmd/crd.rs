//! # Custom resource definition module
//!
//! This module provides custom resource module command line interface function
//! implementation

use std::sync::Arc;

use async_trait::async_trait;
use clap::Subcommand;
use kube::CustomResourceExt;

use crate::{
    cmd::Executor,
    svc::{cfg::Configuration, crd::database::Database},
};

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to serialize custom resource definition, {0}")]
    Serialize(serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// CustomResourceDefinition enum

#[derive(Subcommand, Clone, Debug)]
pub enum CustomResourceDefinition {
    /// View custom resource definition
    #[clap(name = "view", aliases = &["v"])]
    View,
}

#[async_trait]
impl Executor for CustomResourceDefinition {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View => view(config).await,
        }
    }
}

// -----------------------------------------------------------------------------
// view function

pub async fn view(_config: Arc<Configuration>) -> Result<(), Error> {
    let crd = serde_yaml::to_string(&Database::crd()).map_err(Error::Serialize)?;

    print!("{}", crd);
    Ok(())
}
