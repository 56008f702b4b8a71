//! # Resource module
//!
//! This module provide helpers on kubernetes [`Resource`]

use std::fmt::Debug;

use k8s_openapi::{
    api::core::v1::ObjectReference,
    apimachinery::pkg::apis::meta::v1::OwnerReference,
    NamespaceResourceScope,
};
use kube::{
    api::{Patch, PatchParams, PostParams},
    Api, Client, CustomResourceExt, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the resource is considered from kubernetes point of view as deleted
pub fn deleted<T>(obj: &T) -> bool
where
    T: Resource,
{
    obj.meta().deletion_timestamp.is_some()
}

/// returns the namespace and name of the kubernetes resource.
///
/// # Panic
///
/// panic if the namespace or name is null which is impossible btw
pub fn namespaced_name<T>(obj: &T) -> (String, String)
where
    T: ResourceExt,
{
    (
        obj.namespace()
            .expect("resource to be owned by a namespace"),
        obj.name_any(),
    )
}

/// returns differnce between the two given object serialize as json patch
pub fn diff<T>(origin: &T, modified: &T) -> Result<json_patch::Patch, serde_json::Error>
where
    T: Serialize,
{
    Ok(json_patch::diff(
        &serde_json::to_value(origin)?,
        &serde_json::to_value(modified)?,
    ))
}

/// make a patch request on the given resource using the given patch
pub async fn patch<T>(client: Client, obj: &T, patch: json_patch::Patch) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(obj);

    if patch.0.is_empty() {
        debug!(
            namespace = %namespace,
            name = %name,
            "skip patch request on resource, no operation to apply"
        );
        return Ok(obj.to_owned());
    }

    debug!(
        namespace = %namespace,
        name = %name,
        "execute patch request on resource"
    );
    Api::namespaced(client, &namespace)
        .patch(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// make a patch request on the given resource's status using the given patch
pub async fn patch_status<T>(
    client: Client,
    obj: T,
    patch: json_patch::Patch,
) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(&obj);

    if patch.0.is_empty() {
        debug!(
            namespace = %namespace,
            name = %name,
            "skip patch request on resource's status, no operation to apply"
        );
        return Ok(obj);
    }

    debug!(
        namespace = %namespace,
        name = %name,
        "execute patch request on resource's status"
    );
    Api::namespaced(client, &namespace)
        .patch_status(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// returns the resource with the given name in the given namespace, if any
pub async fn get<T>(client: Client, namespace: &str, name: &str) -> Result<Option<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client, namespace);

    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
        Err(err) => Err(err),
    }
}

/// create the resource, if it does not already exist, patch it otherwise
pub async fn upsert<T>(client: Client, obj: &T) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(obj);

    if let Some(origin) = get::<T>(client.to_owned(), &namespace, &name).await? {
        let p = diff(&origin, obj).map_err(kube::Error::SerdeError)?;
        return patch(client, obj, p).await;
    }

    let api: Api<T> = Api::namespaced(client, &namespace);

    debug!(
        namespace = %namespace,
        name = %name,
        "execute a request to create a resource"
    );
    api.create(&PostParams::default(), obj).await
}

/// returns a owner references object pointing to the given resource
pub fn owner_reference<T>(obj: &T) -> OwnerReference
where
    T: ResourceExt + CustomResourceExt,
{
    let api_resource = T::api_resource();

    OwnerReference {
        api_version: api_resource.api_version,
        block_owner_deletion: Some(true),
        controller: None,
        kind: api_resource.kind,
        name: obj.name_any(),
        uid: obj
            .uid()
            .expect("to have an unique identifier provided by kubernetes"),
    }
}

/// returns an object reference pointing to the given resource
pub fn object_reference<T>(obj: &T) -> ObjectReference
where
    T: ResourceExt + CustomResourceExt,
{
    let api_resource = T::api_resource();

    ObjectReference {
        api_version: Some(api_resource.api_version),
        kind: Some(api_resource.kind),
        name: Some(obj.name_any()),
        namespace: obj.namespace(),
        uid: obj.uid(),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;

    use super::diff;

    #[test]
    fn diff_between_identical_resources_is_empty() {
        let secret = Secret::default();

        let patch = diff(&secret, &secret).expect("resources to serialize");

        assert!(patch.0.is_empty());
    }

    #[test]
    fn diff_captures_metadata_changes() {
        let origin = Secret::default();
        let mut modified = origin.clone();
        modified.metadata.finalizers = Some(vec!["rds.aws.com/database".to_string()]);

        let patch = diff(&origin, &modified).expect("resources to serialize");

        assert!(!patch.0.is_empty());
    }
}
