//! # Command module
//!
//! This module provide command line interface structures and helpers
use std::{io, path::PathBuf, process::abort, sync::Arc};

use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info};

use crate::svc::{
    aws,
    cfg::Configuration,
    crd::database,
    k8s::{client, State, Watcher},
};

pub mod crd;

// -----------------------------------------------------------------------------
// Executor trait

#[async_trait]
pub trait Executor {
    type Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error>;
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute command '{0}', {1}")]
    Execution(String, Arc<Error>),
    #[error("failed to execute command, {0}")]
    CustomResourceDefinition(crd::Error),
    #[error("failed to run daemon, {0}")]
    Daemon(DaemonError),
}

// -----------------------------------------------------------------------------
// Command enum

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Interact with custom resource definition
    #[clap(subcommand, name = "custom-resource-definition", aliases = &["crd"])]
    CustomResourceDefinition(crd::CustomResourceDefinition),
}

#[async_trait]
impl Executor for Command {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::CustomResourceDefinition(crd) => crd
                .execute(config)
                .await
                .map_err(Error::CustomResourceDefinition)
                .map_err(|err| {
                    Error::Execution("custom-resource-definition".into(), Arc::new(err))
                }),
        }
    }
}

// -----------------------------------------------------------------------------
// Args struct

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Args {
    /// Increase log verbosity
    #[clap(short = 'v', global = true, action = ArgAction::Count)]
    pub verbosity: u8,
    /// Specify location of kubeconfig
    #[clap(short = 'k', long = "kubeconfig", global = true)]
    pub kubeconfig: Option<PathBuf>,
    /// Specify location of configuration
    #[clap(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Check if configuration is healthy
    #[clap(short = 't', long = "check", global = true)]
    pub check: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

// -----------------------------------------------------------------------------
// DaemonError enum

#[derive(thiserror::Error, Debug)]
pub enum DaemonError {
    #[error("failed to handle termination signal, {0}")]
    SigTerm(io::Error),
    #[error("failed to create kubernetes client, {0}")]
    Client(client::Error),
}

// -----------------------------------------------------------------------------
// daemon function

pub async fn daemon(
    kubeconfig: Option<PathBuf>,
    config: Arc<Configuration>,
) -> Result<(), DaemonError> {
    // -------------------------------------------------------------------------
    // Create a new kubernetes client from path if defined, or via the
    // environment or defaults locations

    let kube_client = client::try_new(kubeconfig)
        .await
        .map_err(DaemonError::Client)?;

    // -------------------------------------------------------------------------
    // Create a new rds client

    let rds_client = aws::rds::Client::new(config.to_owned()).await;

    // -------------------------------------------------------------------------
    // Create state to give to each reconciler

    let state = State::new(kube_client, rds_client, config);

    // -------------------------------------------------------------------------
    // Create reconcilers

    let handles = vec![tokio::spawn(async {
        let reconciler = database::Reconciler::default();

        info!("start to listen for events of database custom resource");
        if let Err(err) = reconciler.watch(state).await {
            error!(
                error = %err,
                "could not reconcile database custom resource"
            );
        }

        abort();
    })];

    // -------------------------------------------------------------------------
    // Wait for termination signal

    tokio::signal::ctrl_c()
        .await
        .map_err(DaemonError::SigTerm)?;

    // -------------------------------------------------------------------------
    // Cancel reconcilers

    handles.iter().for_each(|handle| handle.abort());

    for handle in handles {
        if let Err(err) = handle.await {
            if !err.is_cancelled() {
                error!(
                    error = %err,
                    "could not wait for the task to complete"
                );
            }
        }
    }

    Ok(())
}
