//! # Secret module
//!
//! This module provide helpers to build the connection credentials secret of
//! a database custom resource

use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::{api::ObjectMeta, ResourceExt};

use crate::svc::{aws::Endpoint, crd::database::Database, k8s::resource};

// -----------------------------------------------------------------------------
// Constants

pub const DATABASE_ANNOTATION: &str = "rds.aws.com/database";

// -----------------------------------------------------------------------------
// Helpers

/// returns the name of the credentials secret derived from the custom
/// resource name
pub fn name(db: &Database) -> String {
    format!("{}-db-credentials", db.name_any())
}

/// returns the connection url composed from the specification and the
/// instance endpoint
pub fn url(db: &Database, endpoint: &Endpoint) -> String {
    format!(
        "{}://{}:{}@{}:{}/{}",
        db.spec.engine,
        db.spec.username,
        db.spec.password,
        endpoint.address,
        endpoint.port,
        db.spec.database
    )
}

/// returns the credentials secret for the given database custom resource and
/// instance endpoint. values are stored as opaque raw bytes and the secret is
/// owned by the custom resource, so it is garbage collected with it
pub fn new(db: &Database, endpoint: &Endpoint) -> Secret {
    let mut data = BTreeMap::new();

    data.insert(
        "username".to_string(),
        ByteString(db.spec.username.to_owned().into_bytes()),
    );
    data.insert(
        "password".to_string(),
        ByteString(db.spec.password.to_owned().into_bytes()),
    );
    data.insert(
        "host".to_string(),
        ByteString(endpoint.address.to_owned().into_bytes()),
    );
    data.insert(
        "port".to_string(),
        ByteString(endpoint.port.to_string().into_bytes()),
    );
    data.insert(
        "url".to_string(),
        ByteString(url(db, endpoint).into_bytes()),
    );

    let metadata = ObjectMeta {
        name: Some(name(db)),
        namespace: db.namespace(),
        labels: db.metadata.labels.to_owned(),
        annotations: Some(BTreeMap::from([(
            DATABASE_ANNOTATION.to_string(),
            db.name_any(),
        )])),
        owner_references: Some(vec![resource::owner_reference(db)]),
        ..Default::default()
    };

    Secret {
        metadata,
        data: Some(data),
        ..Default::default()
    }
}
