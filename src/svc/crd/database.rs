//! # Database custom resource
//!
//! This module provide the database custom resource, its definition and its
//! reconciliation logic against the rds api

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use async_trait::async_trait;
use kube::{
    runtime::{controller, watcher, Controller},
    Api, CustomResource, Resource,
};
use rand::{rngs::OsRng, RngCore};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::svc::{
    aws::{self, Provisioner},
    k8s::{
        self, finalizer, recorder, resource, secret,
        store::{self, KubernetesStore, Store},
        ControllerBuilder,
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const DATABASE_FINALIZER: &str = "rds.aws.com/database";

// -----------------------------------------------------------------------------
// State enumeration

/// provisioning state of a database custom resource. `Created` and `Failure`
/// are terminal for creation purposes, the reconciler will not re-attempt
/// provisioning once one of them is reached
#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum State {
    #[default]
    Pending,
    Created,
    Failure,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Created => write!(f, "Created"),
            Self::Failure => write!(f, "Failure"),
        }
    }
}

// -----------------------------------------------------------------------------
// Status structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Status {
    #[serde(rename = "state", default)]
    pub state: State,
    #[serde(rename = "error", default)]
    pub error: String,
}

impl Status {
    pub fn pending() -> Self {
        Self {
            state: State::Pending,
            error: String::new(),
        }
    }

    pub fn created() -> Self {
        Self {
            state: State::Created,
            error: String::new(),
        }
    }

    pub fn failure<T>(err: T) -> Self
    where
        T: ToString,
    {
        Self {
            state: State::Failure,
            error: err.to_string(),
        }
    }

    /// returns if the state is terminal for creation purposes
    pub fn terminal(&self) -> bool {
        matches!(self.state, State::Created | State::Failure)
    }
}

// -----------------------------------------------------------------------------
// Spec structure

#[derive(CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[kube(group = "rds.aws.com")]
#[kube(version = "v1alpha1")]
#[kube(kind = "Database")]
#[kube(singular = "database")]
#[kube(plural = "databases")]
#[kube(shortname = "db")]
#[kube(status = "Status")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
pub struct Spec {
    #[serde(rename = "engine", default)]
    pub engine: String,
    #[serde(rename = "engineVersion", default)]
    pub engine_version: String,
    #[serde(rename = "username", default)]
    pub username: String,
    #[serde(rename = "password", default)]
    pub password: String,
    #[serde(rename = "database", default)]
    pub database: String,
    #[serde(rename = "storage", default)]
    pub storage: i32,
    #[serde(rename = "autoMinorVersionUpgrade", default)]
    pub auto_minor_version_upgrade: bool,
    #[serde(rename = "availabilityZone", default)]
    pub availability_zone: String,
    #[serde(rename = "backupRetentionPeriod", default)]
    pub backup_retention_period: i32,
    #[serde(rename = "characterSetName", default)]
    pub character_set_name: String,
    #[serde(rename = "instanceClass", default)]
    pub instance_class: String,
    #[serde(rename = "subnetGroup", default)]
    pub subnet_group: String,
    #[serde(rename = "iops", default)]
    pub iops: i32,
    #[serde(rename = "multiAz", default)]
    pub multi_az: bool,
    #[serde(rename = "encrypted", default)]
    pub encrypted: bool,
    #[serde(rename = "storageType", default)]
    pub storage_type: String,
    #[serde(rename = "securityGroups", default)]
    pub security_groups: Vec<String>,
}

impl Spec {
    /// fill unset fields with their default value, the password is generated
    /// from the given random source. this happens in memory only, the
    /// specification is never written back to the cluster
    pub fn apply_defaults<R>(&mut self, rng: &mut R)
    where
        R: RngCore,
    {
        if self.engine.is_empty() {
            self.engine = "postgres".to_string();
        }

        if self.engine_version.is_empty() {
            self.engine_version = "10.4".to_string();
        }

        if self.username.is_empty() {
            self.username = "postgres".to_string();
        }

        if self.password.is_empty() {
            let mut buf = [0u8; 32];

            rng.fill_bytes(&mut buf);
            self.password = hex::encode(buf);
        }

        if self.database.is_empty() {
            self.database = "postgres".to_string();
        }

        if self.storage_type.is_empty() {
            self.storage_type = "gp2".to_string();
        }

        if self.instance_class.is_empty() {
            self.instance_class = "db.t2.micro".to_string();
        }

        if self.storage == 0 {
            self.storage = 20;
        }
    }
}

// -----------------------------------------------------------------------------
// Database implementation

impl Database {
    /// returns the rds instance identifier derived from the namespace and
    /// name of the custom resource. it is always recomputed, never stored,
    /// so describe, create and delete address the same instance across
    /// repeated invocations
    pub fn instance_identifier(&self) -> String {
        let (namespace, name) = resource::namespaced_name(self);

        format!("{}-{}", namespace, name)
    }
}

// -----------------------------------------------------------------------------
// Event enumeration

/// a change notification for a database custom resource, as handed over by
/// the dispatcher
#[derive(Clone, Debug)]
pub enum Event {
    Applied(Database),
    Deleted(Database),
}

// -----------------------------------------------------------------------------
// Action structure

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum Action {
    UpsertInstance,
    DeleteInstance,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::UpsertInstance => write!(f, "UpsertInstance"),
            Self::DeleteInstance => write!(f, "DeleteInstance"),
        }
    }
}

// -----------------------------------------------------------------------------
// ReconcilerError enum

#[derive(thiserror::Error, Debug)]
pub enum ReconcilerError {
    #[error("failed to reconcile resource, {0}")]
    Reconcile(String),
    #[error("failed to execute request on aws api, {0}")]
    Aws(aws::Error),
    #[error("failed to execute request on resource store, {0}")]
    Store(store::Error),
    #[error("failed to execute request on kubernetes api, {0}")]
    KubeClient(kube::Error),
    #[error("failed to compute diff between the original and modified object, {0}")]
    Diff(serde_json::Error),
}

impl From<kube::Error> for ReconcilerError {
    fn from(err: kube::Error) -> Self {
        Self::KubeClient(err)
    }
}

impl From<aws::Error> for ReconcilerError {
    fn from(err: aws::Error) -> Self {
        Self::Aws(err)
    }
}

impl From<store::Error> for ReconcilerError {
    fn from(err: store::Error) -> Self {
        Self::Store(err)
    }
}

impl From<controller::Error<Self, watcher::Error>> for ReconcilerError {
    fn from(err: controller::Error<ReconcilerError, watcher::Error>) -> Self {
        Self::Reconcile(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// handle function

/// process one change notification for a database custom resource, driving
/// the provisioner and the store to match the declared intent and persisting
/// the resulting status transition.
///
/// the handler is idempotent under redelivery: terminal resources are left
/// untouched and a creation sequence interrupted half-way resumes safely on
/// the next notification.
///
/// returns the status persisted by this run, if any, so the caller can
/// report the outcome on the custom resource
pub async fn handle<P, S, R>(
    provisioner: &P,
    store: &S,
    rng: &mut R,
    event: Event,
) -> Result<Option<Status>, ReconcilerError>
where
    P: Provisioner + Sync,
    S: Store + Sync,
    R: RngCore + Send,
{
    match event {
        Event::Deleted(db) => {
            let identifier = db.instance_identifier();

            info!(identifier = %identifier, "delete database instance");
            // the resource itself is being removed by the caller, so there is
            // no status to write on this path. an instance that does not
            // exist, never created or removed out-of-band, is an already
            // completed teardown
            match provisioner.delete(&identifier).await {
                Ok(()) => Ok(None),
                Err(err) if err.is_not_found() => {
                    debug!(
                        identifier = %identifier,
                        "database instance is already deleted"
                    );
                    Ok(None)
                }
                Err(err) => Err(ReconcilerError::Aws(err)),
            }
        }
        Event::Applied(mut db) => {
            if db
                .status
                .as_ref()
                .map(Status::terminal)
                .unwrap_or_default()
            {
                debug!(
                    identifier = %db.instance_identifier(),
                    "skip reconciliation of database custom resource in terminal state"
                );
                return Ok(None);
            }

            // provisioning must not proceed without a durable status
            // transition acknowledged by the store
            store
                .update_status(&db, Status::pending())
                .await
                .map_err(ReconcilerError::Store)?;

            db.spec.apply_defaults(rng);

            let status = match provision(provisioner, store, &db).await {
                Ok(()) => Status::created(),
                Err(err) => Status::failure(&err),
            };

            store
                .update_status(&db, status.to_owned())
                .await
                .map_err(ReconcilerError::Store)?;

            Ok(Some(status))
        }
    }
}

/// run the creation sequence for the given database custom resource. the
/// sequence is re-entrant against partial prior runs, an already provisioned
/// instance or an already created secret are treated as success
async fn provision<P, S>(provisioner: &P, store: &S, db: &Database) -> Result<(), ReconcilerError>
where
    P: Provisioner + Sync,
    S: Store + Sync,
{
    let identifier = db.instance_identifier();

    match provisioner.describe(&identifier).await {
        Ok(()) => {
            info!(identifier = %identifier, "database instance already exists");
            return Ok(());
        }
        Err(err) if err.is_not_found() => {}
        // only the typed not-found answer proceeds to create, anything else
        // is surfaced instead of being masked as non-existence
        Err(err) => return Err(ReconcilerError::Aws(err)),
    }

    info!(identifier = %identifier, "create database instance");
    let endpoint = provisioner
        .create(&identifier, &db.spec)
        .await
        .map_err(ReconcilerError::Aws)?;

    debug!(identifier = %identifier, "create credentials secret");
    match store.create_secret(&secret::new(db, &endpoint)).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_already_exists() => Ok(()),
        Err(err) => Err(ReconcilerError::Store(err)),
    }
}

// -----------------------------------------------------------------------------
// Reconciler structure

#[derive(Clone, Default, Debug)]
pub struct Reconciler {}

impl ControllerBuilder<Database> for Reconciler {
    fn build(&self, state: k8s::State) -> Controller<Database> {
        Controller::new(Api::all(state.kube), watcher::Config::default())
    }
}

#[async_trait]
impl k8s::Reconciler<Database> for Reconciler {
    type Error = ReconcilerError;

    async fn upsert(ctx: Arc<k8s::State>, origin: Arc<Database>) -> Result<(), ReconcilerError> {
        let kind = Database::kind(&()).to_string();
        let (namespace, name) = resource::namespaced_name(&*origin);

        // ---------------------------------------------------------------------
        // Step 1: set finalizer, deletion of the custom resource has to wait
        // for the database instance teardown

        debug!(
            kind = %kind,
            namespace = %namespace,
            name = %name,
            "set finalizer on custom resource"
        );
        let modified = finalizer::add((*origin).to_owned(), DATABASE_FINALIZER);
        let patch = resource::diff(&*origin, &modified).map_err(ReconcilerError::Diff)?;
        let modified = resource::patch(ctx.kube.to_owned(), &modified, patch).await?;

        // ---------------------------------------------------------------------
        // Step 2: run the reconciliation state machine

        let store = KubernetesStore::from(ctx.kube.to_owned());

        let status = handle(
            &ctx.aws,
            &store,
            &mut OsRng,
            Event::Applied(modified.to_owned()),
        )
        .await?;

        // ---------------------------------------------------------------------
        // Step 3: report the outcome on the custom resource

        match status {
            Some(status) if State::Failure == status.state => {
                let message = &format!(
                    "Failed to reconcile database instance '{}', {}",
                    modified.instance_identifier(),
                    status.error
                );
                recorder::warning(ctx.kube.to_owned(), &modified, &Action::UpsertInstance, message)
                    .await?;
            }
            _ => {
                let message = &format!(
                    "Reconcile database instance '{}'",
                    modified.instance_identifier()
                );
                recorder::normal(ctx.kube.to_owned(), &modified, &Action::UpsertInstance, message)
                    .await?;
            }
        }

        Ok(())
    }

    async fn delete(ctx: Arc<k8s::State>, origin: Arc<Database>) -> Result<(), ReconcilerError> {
        let kind = Database::kind(&()).to_string();
        let (namespace, name) = resource::namespaced_name(&*origin);

        // ---------------------------------------------------------------------
        // Step 1: delete the database instance

        debug!(
            kind = %kind,
            namespace = %namespace,
            name = %name,
            "delete database instance of custom resource"
        );
        let store = KubernetesStore::from(ctx.kube.to_owned());

        handle(
            &ctx.aws,
            &store,
            &mut OsRng,
            Event::Deleted((*origin).to_owned()),
        )
        .await?;

        let message = &format!(
            "Delete database instance '{}'",
            origin.instance_identifier()
        );
        recorder::normal(ctx.kube.to_owned(), &*origin, &Action::DeleteInstance, message).await?;

        // ---------------------------------------------------------------------
        // Step 2: remove the finalizer, so kubernetes collects the resource

        debug!(
            kind = %kind,
            namespace = %namespace,
            name = %name,
            "remove finalizer on custom resource"
        );
        let modified = finalizer::remove((*origin).to_owned(), DATABASE_FINALIZER);
        let patch = resource::diff(&*origin, &modified).map_err(ReconcilerError::Diff)?;
        resource::patch(ctx.kube.to_owned(), &modified, patch).await?;

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Fixtures

#[cfg(test)]
pub mod fixtures {
    use kube::api::ObjectMeta;

    use super::{Database, Spec};

    /// returns a database custom resource the way the cluster api would hand
    /// it over, with namespace, name and unique identifier populated
    pub fn database(namespace: &str, name: &str) -> Database {
        let mut db = Database::new(name, Spec::default());

        db.metadata = ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            uid: Some("6bdfc5aa-0b92-4e06-8571-92db31f3b912".to_string()),
            ..Default::default()
        };

        db
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::Secret;
    use rand::rngs::mock::StepRng;

    use super::{fixtures::database, handle, Event, Spec, State, Status};
    use crate::svc::{
        aws::{self, Endpoint, Provisioner},
        k8s::{
            resource,
            store::{self, Store},
        },
    };

    fn kube_error(message: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        })
    }

    #[derive(Default)]
    struct MockProvisioner {
        exists: bool,
        describe_error: Option<&'static str>,
        create_error: Option<&'static str>,
        delete_not_found: bool,
        delete_error: Option<&'static str>,
        calls: Mutex<Vec<String>>,
        created: Mutex<Vec<(String, Spec)>>,
    }

    impl MockProvisioner {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("mutex to not be poisoned").clone()
        }
    }

    #[async_trait]
    impl Provisioner for MockProvisioner {
        async fn describe(&self, identifier: &str) -> Result<(), aws::Error> {
            self.calls
                .lock()
                .expect("mutex to not be poisoned")
                .push(format!("describe:{}", identifier));

            if let Some(message) = self.describe_error {
                return Err(aws::Error::Describe(message.into()));
            }

            if self.exists {
                Ok(())
            } else {
                Err(aws::Error::InstanceNotFound(identifier.to_string()))
            }
        }

        async fn create(&self, identifier: &str, spec: &Spec) -> Result<Endpoint, aws::Error> {
            self.calls
                .lock()
                .expect("mutex to not be poisoned")
                .push(format!("create:{}", identifier));

            if let Some(message) = self.create_error {
                return Err(aws::Error::Create(message.into()));
            }

            self.created
                .lock()
                .expect("mutex to not be poisoned")
                .push((identifier.to_string(), spec.to_owned()));

            Ok(Endpoint {
                address: "h".to_string(),
                port: 5432,
            })
        }

        async fn delete(&self, identifier: &str) -> Result<(), aws::Error> {
            self.calls
                .lock()
                .expect("mutex to not be poisoned")
                .push(format!("delete:{}", identifier));

            if self.delete_not_found {
                return Err(aws::Error::InstanceNotFound(identifier.to_string()));
            }

            if let Some(message) = self.delete_error {
                return Err(aws::Error::Delete(message.into()));
            }

            Ok(())
        }
    }

    #[derive(Default)]
    struct MockStore {
        update_error: bool,
        secret_exists: bool,
        secret_error: Option<&'static str>,
        statuses: Mutex<Vec<Status>>,
        secrets: Mutex<Vec<Secret>>,
    }

    impl MockStore {
        fn statuses(&self) -> Vec<Status> {
            self.statuses
                .lock()
                .expect("mutex to not be poisoned")
                .clone()
        }

        fn secrets(&self) -> Vec<Secret> {
            self.secrets
                .lock()
                .expect("mutex to not be poisoned")
                .clone()
        }
    }

    #[async_trait]
    impl Store for MockStore {
        async fn update_status(
            &self,
            _db: &super::Database,
            status: Status,
        ) -> Result<(), store::Error> {
            if self.update_error {
                return Err(store::Error::Kube(kube_error("status write denied")));
            }

            self.statuses
                .lock()
                .expect("mutex to not be poisoned")
                .push(status);

            Ok(())
        }

        async fn create_secret(&self, secret: &Secret) -> Result<(), store::Error> {
            if self.secret_exists {
                let (namespace, name) = resource::namespaced_name(secret);
                return Err(store::Error::AlreadyExists { namespace, name });
            }

            if let Some(message) = self.secret_error {
                return Err(store::Error::Kube(kube_error(message)));
            }

            self.secrets
                .lock()
                .expect("mutex to not be poisoned")
                .push(secret.to_owned());

            Ok(())
        }
    }

    fn rng() -> StepRng {
        StepRng::new(0, 1)
    }

    #[test]
    fn instance_identifier_is_deterministic() {
        assert_eq!("ns-db", database("ns", "db").instance_identifier());
        assert_eq!("ns-db", database("ns", "db").instance_identifier());
    }

    #[test]
    fn defaults_fill_only_unset_fields() {
        let mut spec = Spec::default();
        spec.apply_defaults(&mut rng());

        assert_eq!("postgres", spec.engine);
        assert_eq!("10.4", spec.engine_version);
        assert_eq!("postgres", spec.username);
        assert_eq!("postgres", spec.database);
        assert_eq!("gp2", spec.storage_type);
        assert_eq!("db.t2.micro", spec.instance_class);
        assert_eq!(20, spec.storage);
        assert_eq!(64, spec.password.len());
        assert!(spec.password.chars().all(|c| c.is_ascii_hexdigit()));

        // fields without a default stay at their zero value
        assert_eq!("", spec.availability_zone);
        assert_eq!(0, spec.iops);
        assert!(!spec.multi_az);
    }

    #[test]
    fn defaults_keep_given_values() {
        let mut spec = Spec {
            engine: "mysql".to_string(),
            password: "given".to_string(),
            storage: 100,
            ..Default::default()
        };

        spec.apply_defaults(&mut rng());

        assert_eq!("mysql", spec.engine);
        assert_eq!("given", spec.password);
        assert_eq!(100, spec.storage);
    }

    #[tokio::test]
    async fn brand_new_resource_is_provisioned() {
        let provisioner = MockProvisioner::default();
        let store = MockStore::default();

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        assert_eq!(
            Some(Status::created()),
            result.expect("reconciliation to succeed")
        );
        assert_eq!(
            vec!["describe:ns-db".to_string(), "create:ns-db".to_string()],
            provisioner.calls()
        );

        let statuses = store.statuses();
        assert_eq!(2, statuses.len());
        assert_eq!(Status::pending(), statuses[0]);
        assert_eq!(Status::created(), statuses[1]);

        // the secret carries the composed connection url with the generated
        // password
        let created = provisioner
            .created
            .lock()
            .expect("mutex to not be poisoned")
            .clone();
        let password = created[0].1.password.to_owned();
        assert!(!password.is_empty());

        let secrets = store.secrets();
        assert_eq!(1, secrets.len());
        assert_eq!(Some("db-db-credentials".to_string()), secrets[0].metadata.name);

        let data = secrets[0].data.to_owned().expect("secret to carry data");
        assert_eq!(
            format!("postgres://postgres:{}@h:5432/postgres", password).into_bytes(),
            data.get("url").expect("secret to carry an url").0
        );
    }

    #[tokio::test]
    async fn terminal_resource_is_left_untouched() {
        for state in [State::Created, State::Failure] {
            let provisioner = MockProvisioner::default();
            let store = MockStore::default();

            let mut db = database("ns", "db");
            db.status = Some(Status {
                state,
                error: String::new(),
            });

            let result = handle(&provisioner, &store, &mut rng(), Event::Applied(db)).await;

            assert!(result.expect("terminal resource to be a no-op").is_none());
            assert!(provisioner.calls().is_empty());
            assert!(store.statuses().is_empty());
            assert!(store.secrets().is_empty());
        }
    }

    #[tokio::test]
    async fn provisioner_is_never_called_without_durable_pending_status() {
        let provisioner = MockProvisioner::default();
        let store = MockStore {
            update_error: true,
            ..Default::default()
        };

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        assert!(result.is_err());
        assert!(provisioner.calls().is_empty());
    }

    #[tokio::test]
    async fn describe_failure_is_surfaced_instead_of_masked() {
        let provisioner = MockProvisioner {
            describe_error: Some("throttled"),
            ..Default::default()
        };
        let store = MockStore::default();

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        // the failure is recorded on the resource, the handler itself
        // returns the persisted status once the write succeeds
        assert!(result.is_ok());
        assert_eq!(vec!["describe:ns-db".to_string()], provisioner.calls());

        let statuses = store.statuses();
        assert_eq!(State::Failure, statuses[1].state);
        assert!(statuses[1].error.contains("throttled"));
    }

    #[tokio::test]
    async fn creation_failure_is_recorded_with_its_message() {
        let provisioner = MockProvisioner {
            create_error: Some("test-error"),
            ..Default::default()
        };
        let store = MockStore::default();

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        // the returned status matches the persisted one, so the caller can
        // report the failure on the custom resource
        let status = result
            .expect("status write to succeed")
            .expect("a status to be persisted");
        assert_eq!(State::Failure, status.state);

        let statuses = store.statuses();
        assert_eq!(status, statuses[1]);
        assert_eq!(
            format!(
                "failed to execute request on aws api, {}",
                aws::Error::Create("test-error".into())
            ),
            statuses[1].error
        );
    }

    #[tokio::test]
    async fn existing_instance_short_circuits_creation() {
        let provisioner = MockProvisioner {
            exists: true,
            ..Default::default()
        };
        let store = MockStore::default();

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(vec!["describe:ns-db".to_string()], provisioner.calls());
        assert!(store.secrets().is_empty());

        let statuses = store.statuses();
        assert_eq!(Status::created(), statuses[1]);
    }

    #[tokio::test]
    async fn already_existing_secret_is_a_successful_re_entry() {
        let provisioner = MockProvisioner::default();
        let store = MockStore {
            secret_exists: true,
            ..Default::default()
        };

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        assert!(result.is_ok());

        let statuses = store.statuses();
        assert_eq!(Status::created(), statuses[1]);
    }

    #[tokio::test]
    async fn secret_creation_failure_is_recorded() {
        let provisioner = MockProvisioner::default();
        let store = MockStore {
            secret_error: Some("secret denied"),
            ..Default::default()
        };

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;

        assert!(result.is_ok());

        let statuses = store.statuses();
        assert_eq!(State::Failure, statuses[1].state);
        assert!(statuses[1].error.contains("secret denied"));
    }

    #[tokio::test]
    async fn deletion_only_calls_the_provisioner() {
        let provisioner = MockProvisioner::default();
        let store = MockStore::default();

        let mut db = database("ns", "db");
        db.status = Some(Status::created());

        let result = handle(&provisioner, &store, &mut rng(), Event::Deleted(db)).await;

        assert!(result.is_ok());
        assert_eq!(vec!["delete:ns-db".to_string()], provisioner.calls());
        assert!(store.statuses().is_empty());
        assert!(store.secrets().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_never_provisioned_resource_succeeds() {
        let provisioner = MockProvisioner {
            delete_not_found: true,
            ..Default::default()
        };
        let store = MockStore::default();

        // a resource whose provisioning failed carries a terminal failure
        // status and no matching database instance, its teardown has to
        // complete anyway so the finalizer can be removed
        let mut db = database("ns", "db");
        db.status = Some(Status {
            state: State::Failure,
            error: "kaboom".to_string(),
        });

        let result = handle(&provisioner, &store, &mut rng(), Event::Deleted(db)).await;

        assert!(result.is_ok());
        assert_eq!(vec!["delete:ns-db".to_string()], provisioner.calls());
    }

    #[tokio::test]
    async fn deletion_failure_is_surfaced() {
        let provisioner = MockProvisioner {
            delete_error: Some("throttled"),
            ..Default::default()
        };
        let store = MockStore::default();

        let mut db = database("ns", "db");
        db.status = Some(Status::created());

        let result = handle(&provisioner, &store, &mut rng(), Event::Deleted(db)).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn repeated_provisioning_is_idempotent() {
        let provisioner = MockProvisioner::default();
        let store = MockStore::default();

        let result = handle(
            &provisioner,
            &store,
            &mut rng(),
            Event::Applied(database("ns", "db")),
        )
        .await;
        assert!(result.is_ok());

        // redeliver the resource as the cluster now sees it, with the
        // terminal status persisted by the first run
        let mut db = database("ns", "db");
        db.status = store.statuses().last().cloned();

        let result = handle(&provisioner, &store, &mut rng(), Event::Applied(db)).await;
        assert!(result.is_ok());

        assert_eq!(1, store.secrets().len());
        assert_eq!(
            1,
            provisioner
                .calls()
                .iter()
                .filter(|call| call.starts_with("create:"))
                .count()
        );
    }
}
