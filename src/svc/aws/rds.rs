//! # Relational Database Service module
//!
//! This module provide a client for the rds api implementing the
//! [`Provisioner`] capability

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use tracing::debug;

use crate::svc::{
    aws::{Endpoint, Error, Provisioner},
    cfg::Configuration,
    crd::database::Spec,
};

// -----------------------------------------------------------------------------
// Helpers

/// map the zero value of a string field to an absent request field
fn opt_str(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

/// map the zero value of an integer field to an absent request field
fn opt_i32(i: i32) -> Option<i32> {
    if i == 0 {
        None
    } else {
        Some(i)
    }
}

fn opt_vec(v: &[String]) -> Option<Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_vec())
    }
}

// -----------------------------------------------------------------------------
// Client structure

/// thin translation layer between the reconciler and the rds api, there is
/// no decision logic here besides error classification
#[derive(Clone, Debug)]
pub struct Client {
    inner: aws_sdk_rds::Client,
}

impl Client {
    /// returns a new rds client, credentials and region are resolved through
    /// the usual aws chain with optional overrides from the configuration
    pub async fn new(config: Arc<Configuration>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.aws.region {
            loader = loader.region(Region::new(region.to_owned()));
        }

        if let Some(endpoint) = &config.aws.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        Self {
            inner: aws_sdk_rds::Client::new(&loader.load().await),
        }
    }
}

#[async_trait]
impl Provisioner for Client {
    async fn describe(&self, identifier: &str) -> Result<(), Error> {
        debug!(identifier, "execute a request to describe database instance");
        self.inner
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|err| err.is_db_instance_not_found_fault())
                    .unwrap_or(false)
                {
                    Error::InstanceNotFound(identifier.to_owned())
                } else {
                    Error::Describe(err.into())
                }
            })
    }

    async fn create(&self, identifier: &str, spec: &Spec) -> Result<Endpoint, Error> {
        debug!(identifier, "execute a request to create database instance");
        let output = self
            .inner
            .create_db_instance()
            .db_instance_identifier(identifier)
            .set_master_username(opt_str(&spec.username))
            .set_master_user_password(opt_str(&spec.password))
            .set_db_name(opt_str(&spec.database))
            .set_engine(opt_str(&spec.engine))
            .set_engine_version(opt_str(&spec.engine_version))
            .set_allocated_storage(opt_i32(spec.storage))
            .auto_minor_version_upgrade(spec.auto_minor_version_upgrade)
            .set_availability_zone(opt_str(&spec.availability_zone))
            .set_backup_retention_period(opt_i32(spec.backup_retention_period))
            .set_character_set_name(opt_str(&spec.character_set_name))
            .set_db_instance_class(opt_str(&spec.instance_class))
            .set_db_subnet_group_name(opt_str(&spec.subnet_group))
            .set_iops(opt_i32(spec.iops))
            .set_storage_type(opt_str(&spec.storage_type))
            .multi_az(spec.multi_az)
            .storage_encrypted(spec.encrypted)
            .set_vpc_security_group_ids(opt_vec(&spec.security_groups))
            .send()
            .await
            .map_err(|err| Error::Create(err.into()))?;

        output
            .db_instance()
            .and_then(|instance| instance.endpoint())
            .and_then(|endpoint| {
                Some(Endpoint {
                    address: endpoint.address()?.to_owned(),
                    port: endpoint.port()?,
                })
            })
            .ok_or_else(|| Error::MissingEndpoint(identifier.to_owned()))
    }

    async fn delete(&self, identifier: &str) -> Result<(), Error> {
        debug!(identifier, "execute a request to delete database instance");
        self.inner
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|err| err.is_db_instance_not_found_fault())
                    .unwrap_or(false)
                {
                    Error::InstanceNotFound(identifier.to_owned())
                } else {
                    Error::Delete(err.into())
                }
            })
    }
}
