//! # Kubernetes module
//!
//! This module provide the kubernetes custom resource watch plumbing, helpers
//! and the store capability implementation

use std::{error::Error, fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kube::{
    runtime::{
        controller::{self, Action},
        watcher, Controller,
    },
    CustomResourceExt, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace};

use crate::svc::{aws, cfg::Configuration};

pub mod client;
pub mod finalizer;
pub mod recorder;
pub mod resource;
pub mod secret;
pub mod store;

// -----------------------------------------------------------------------------
// State structure

/// contains clients to interact with the kubernetes and aws apis.
#[derive(Clone)]
pub struct State {
    pub kube: kube::Client,
    pub aws: aws::rds::Client,
    pub config: Arc<Configuration>,
}

impl From<(kube::Client, aws::rds::Client, Arc<Configuration>)> for State {
    fn from((kube, aws, config): (kube::Client, aws::rds::Client, Arc<Configuration>)) -> Self {
        Self { kube, aws, config }
    }
}

impl State {
    pub fn new(k: kube::Client, a: aws::rds::Client, c: Arc<Configuration>) -> Self {
        Self::from((k, a, c))
    }
}

// -----------------------------------------------------------------------------
// ControllerBuilder trait

/// provides a common way to create a kubernetes
/// controller [`Controller<T>`]
pub trait ControllerBuilder<T>
where
    T: Resource + Clone + Debug,
    <T as Resource>::DynamicType: Eq + Hash,
{
    /// returns a new created kubernetes controller
    fn build(&self, state: State) -> Controller<T>;
}

// -----------------------------------------------------------------------------
// Reconciler trait

/// provides the two halves of the reconcile function which is given to a
/// kubernetes controller [`Controller<T>`]
#[async_trait]
pub trait Reconciler<T>
where
    T: ResourceExt + CustomResourceExt + Debug + Clone + Send + Sync + 'static,
{
    type Error: Error + Send + Sync;

    /// create or update the object, this is part of the reconcile function
    async fn upsert(ctx: Arc<State>, obj: Arc<T>) -> Result<(), Self::Error>;

    /// delete the object from kubernetes and third parts
    async fn delete(ctx: Arc<State>, obj: Arc<T>) -> Result<(), Self::Error>;

    /// returns a [`Action`] to perform following the given error
    fn retry(err: &Self::Error, _ctx: Arc<State>) -> Action {
        // Re-schedule failed reconciliations 500 ms later
        trace!(duration = 500, error = %err, "requeue failed reconciliation");
        Action::requeue(Duration::from_millis(500))
    }

    /// process the object and perform actions on kubernetes and/or the cloud
    /// provider api, returns a [`Action`] to maybe perform another
    /// reconciliation or an error, if something gets wrong.
    async fn reconcile(obj: Arc<T>, ctx: Arc<State>) -> Result<Action, Self::Error> {
        let (namespace, name) = resource::namespaced_name(&*obj);
        let api_resource = T::api_resource();

        if resource::deleted(&*obj) {
            info!(
                kind = %api_resource.kind,
                namespace = %namespace,
                name = %name,
                "received deletion event for custom resource"
            );

            if let Err(err) = Self::delete(ctx, obj.to_owned()).await {
                error!(
                    kind = %api_resource.kind,
                    namespace = %namespace,
                    name = %name,
                    error = %err,
                    "failed to delete custom resource"
                );
                return Err(err);
            }
        } else {
            info!(
                kind = %api_resource.kind,
                namespace = %namespace,
                name = %name,
                "received upsertion event for custom resource"
            );

            if let Err(err) = Self::upsert(ctx, obj.to_owned()).await {
                error!(
                    kind = %api_resource.kind,
                    namespace = %namespace,
                    name = %name,
                    error = %err,
                    "failed to upsert custom resource"
                );
                return Err(err);
            }
        }

        Ok(Action::await_change())
    }
}

// -----------------------------------------------------------------------------
// WatcherError trait

/// group other trait needed to provide a default
/// implementation for [`Watcher<T>`] trait
pub trait WatcherError:
    From<kube::Error> + From<controller::Error<Self, watcher::Error>> + Error
where
    Self: 'static,
{
}

/// Blanket implementation of [`WatcherError`]
impl<T> WatcherError for T
where
    T: From<kube::Error> + From<controller::Error<Self, watcher::Error>> + Error,
    Self: 'static,
{
}

// -----------------------------------------------------------------------------
// Watcher trait

/// provides a watch method that listen to events of
/// kubernetes custom resource using a [`Controller<T>`]
#[async_trait]
pub trait Watcher<T>: ControllerBuilder<T> + Reconciler<T>
where
    T: DeserializeOwned + ResourceExt + CustomResourceExt + Clone + Debug + Send + Sync + 'static,
    <T as Resource>::DynamicType: Unpin + Eq + Hash + Clone + Debug + Send + Sync + Default,
    Self: Send + Sync + 'static,
    <Self as Reconciler<T>>::Error: WatcherError + Send + Sync,
{
    type Error: WatcherError + Send + Sync;

    /// listen for events of the custom resource as generic parameter
    async fn watch(&self, state: State) -> Result<(), <Self as Watcher<T>>::Error> {
        let context = Arc::new(state.to_owned());
        let api_resource = T::api_resource();
        let mut stream = self
            .build(state)
            .run(
                Self::reconcile,
                |_obj, err, ctx| Self::retry(err, ctx),
                context,
            )
            .boxed();

        loop {
            let instant = Instant::now();

            match stream.try_next().await {
                Ok(None) => {
                    debug!("we have reached the end of the infinite watch stream");
                    return Ok(());
                }
                Ok(Some((obj, _action))) => {
                    info!(
                        kind = %api_resource.kind,
                        namespace = obj.namespace.as_deref().unwrap_or(""),
                        name = %obj.name,
                        "successfully reconcile resource"
                    );
                }
                Err(controller::Error::ObjectNotFound(obj_ref)) => {
                    debug!(
                        namespace = obj_ref.namespace.as_deref().unwrap_or(""),
                        name = %obj_ref.name,
                        "received an event about an already deleted resource"
                    );
                }
                Err(err) => {
                    error!(
                        kind = %api_resource.kind,
                        error = %err,
                        "failed to reconcile resource"
                    );
                }
            }

            sleep_until(instant + Duration::from_millis(100)).await;
        }
    }
}

/// Blanket implementation for [`Watcher<T>`]
impl<T, U> Watcher<T> for U
where
    T: DeserializeOwned + ResourceExt + CustomResourceExt + Clone + Debug + Send + Sync + 'static,
    <T as Resource>::DynamicType: Unpin + Eq + Hash + Clone + Debug + Send + Sync + Default,
    U: Reconciler<T> + ControllerBuilder<T>,
    U::Error: WatcherError + Send + Sync,
    Self: Send + Sync + 'static,
{
    type Error = U::Error;
}
