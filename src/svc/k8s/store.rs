//! # Store module
//!
//! This module provide the resource store capability consumed by the
//! reconciler, persisting status transitions and dependent objects through
//! the kubernetes api

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::PostParams, Api};
use tracing::debug;

use crate::svc::{
    crd::database::{Database, Status},
    k8s::resource,
};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("secret '{namespace}/{name}' already exists")]
    AlreadyExists { namespace: String, name: String },
    #[error("failed to execute request on kubernetes api, {0}")]
    Kube(kube::Error),
    #[error("failed to compute diff between the original and modified object, {0}")]
    Diff(serde_json::Error),
}

impl Error {
    /// returns if the error is the typed "already exists" answer of a secret
    /// creation, which the reconciler treats as a successful re-entry
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

// -----------------------------------------------------------------------------
// Store trait

/// narrow capability interface over the resource store. the reconciler
/// persists status snapshots and dependent secrets through it and never
/// touches the cluster api in any other way
#[async_trait]
pub trait Store {
    /// persist the given status snapshot for the resource
    async fn update_status(&self, db: &Database, status: Status) -> Result<(), Error>;

    /// create the given secret, fails distinctly if it already exists
    async fn create_secret(&self, secret: &Secret) -> Result<(), Error>;
}

// -----------------------------------------------------------------------------
// KubernetesStore structure

#[derive(Clone)]
pub struct KubernetesStore {
    client: kube::Client,
}

impl From<kube::Client> for KubernetesStore {
    fn from(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Store for KubernetesStore {
    async fn update_status(&self, db: &Database, status: Status) -> Result<(), Error> {
        let (namespace, name) = resource::namespaced_name(db);

        debug!(
            namespace = %namespace,
            name = %name,
            state = %status.state,
            "persist status of database custom resource"
        );

        // the snapshot only differs from the original by its status, so the
        // computed patch never touches the specification
        let mut modified = db.to_owned();
        modified.status = Some(status);

        let patch = resource::diff(db, &modified).map_err(Error::Diff)?;
        resource::patch_status(self.client.to_owned(), modified, patch)
            .await
            .map(|_| ())
            .map_err(Error::Kube)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let (namespace, name) = resource::namespaced_name(secret);
        let api: Api<Secret> = Api::namespaced(self.client.to_owned(), &namespace);

        debug!(
            namespace = %namespace,
            name = %name,
            "execute a request to create a secret"
        );
        match api.create(&PostParams::default(), secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                Err(Error::AlreadyExists { namespace, name })
            }
            Err(err) => Err(Error::Kube(err)),
        }
    }
}
