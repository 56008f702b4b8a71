//! # Amazon Web Services module
//!
//! This module provide the provisioner capability consumed by the reconciler
//! and its implementation on top of the `aws-sdk-rds` crate.

use async_trait::async_trait;

use crate::svc::crd::database::Spec;

pub mod rds;

// -----------------------------------------------------------------------------
// BoxError type alias

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("database instance '{0}' does not exist")]
    InstanceNotFound(String),
    #[error("failed to describe database instance, {0}")]
    Describe(BoxError),
    #[error("failed to create database instance, {0}")]
    Create(BoxError),
    #[error("failed to delete database instance, {0}")]
    Delete(BoxError),
    #[error("database instance '{0}' has no connection endpoint yet")]
    MissingEndpoint(String),
}

impl Error {
    /// returns if the error is the typed "instance does not exist" answer,
    /// the only describe outcome allowed to trigger a creation and an
    /// already completed teardown on the delete path
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::InstanceNotFound(_))
    }
}

// -----------------------------------------------------------------------------
// Endpoint structure

/// connection endpoint of a provisioned database instance
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Endpoint {
    pub address: String,
    pub port: i32,
}

// -----------------------------------------------------------------------------
// Provisioner trait

/// narrow capability interface over the managed-database cloud api. the
/// reconciler only ever addresses instances through the identifier it
/// derives from the custom resource
#[async_trait]
pub trait Provisioner {
    /// returns successfully, if the database instance exists
    async fn describe(&self, identifier: &str) -> Result<(), Error>;

    /// create the database instance from the given specification and returns
    /// its connection endpoint
    async fn create(&self, identifier: &str, spec: &Spec) -> Result<Endpoint, Error>;

    /// delete the database instance, an instance that does not exist is
    /// reported with the typed not-found answer
    async fn delete(&self, identifier: &str) -> Result<(), Error>;
}
