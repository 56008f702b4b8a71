//! # Client module
//!
//! This module provide an helper to create a kubernetes client

use std::path::PathBuf;

use kube::{
    config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError},
    Config,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read kubernetes configuration file, {0}")]
    Kubeconfig(KubeconfigError),
    #[error("failed to infer kubernetes configuration, {0}")]
    Infer(InferConfigError),
    #[error("failed to create kubernetes client, {0}")]
    CreateClient(kube::Error),
}

/// returns a new kubernetes client from the given kubeconfig path if defined,
/// inferred from the environment otherwise which covers both the in-cluster
/// service account and the local kubeconfig cases
pub async fn try_new(path: Option<PathBuf>) -> Result<kube::Client, Error> {
    let config = match path {
        None => Config::infer().await.map_err(Error::Infer)?,
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(Error::Kubeconfig)?;

            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(Error::Kubeconfig)?
        }
    };

    kube::Client::try_from(config).map_err(Error::CreateClient)
}
