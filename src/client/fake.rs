// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory clientset for tests.
//!
//! [`FakeClientset`] serves every verb from a [`MemoryStorage`] per kind and
//! records each call as an [`Action`] before handling it. Reactors
//! registered with [`FakeClientset::prepend_reactor`] can intercept a call
//! and return a canned object or error.
//!
//! The fake does not run validation or defaulting. Resource versions are
//! still enforced, so stale writes fail with `Conflict` as they would
//! against a real server.
//!
//! # Example
//!
//! ```rust
//! use cluster_registry::client::fake::{FakeClientset, Verb};
//! use cluster_registry::client::RegistryInterface;
//! use cluster_registry::crd::{Cluster, ClusterSpec};
//! use cluster_registry::errors::RegistryError;
//! use cluster_registry::options::CreateOptions;
//!
//! # async fn example() -> Result<(), RegistryError> {
//! let fake = FakeClientset::new();
//! fake.clusters()
//!     .create(&Cluster::new("cluster-s", ClusterSpec::default()), &CreateOptions::default())
//!     .await?;
//! assert_eq!(fake.actions()[0].verb, Verb::Create);
//! # Ok(())
//! # }
//! ```

use super::{ClientConfig, RegistryInterface, ResourceClient};
use crate::constants::SUBRESOURCE_STATUS;
use crate::crd::{Cluster, MultiClusterServiceDNSRecord, RegistryKind};
use crate::errors::RegistryError;
use crate::options::{
    CreateOptions, DeleteOptions, DeleteOutcome, ListOptions, PatchOptions, PatchType,
    ResourceList, UpdateOptions, WatchOptions, WatchStream,
};
use crate::patch::apply_patch;
use crate::registry::memory::MemoryStorage;
use crate::registry::{generate_name, SelectionPredicate, Storage};
use crate::strategy::object_meta_attrs;
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Verb of a recorded client call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Watch,
    Create,
    Update,
    Delete,
    DeleteCollection,
    Patch,
}

impl Verb {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Watch => "watch",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "delete-collection",
            Verb::Patch => "patch",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded call against the fake.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub verb: Verb,
    /// Plural resource name, e.g. `clusters`.
    pub resource: String,
    pub namespace: Option<String>,
    pub subresource: Option<String>,
    pub name: Option<String>,
    /// Object sent with create and update, or the patch document.
    pub payload: Option<Value>,
}

impl Action {
    fn new<K: RegistryKind>(verb: Verb, namespace: Option<&str>) -> Self {
        Self {
            verb,
            resource: K::plural(&()).to_string(),
            namespace: namespace.map(str::to_string),
            subresource: None,
            name: None,
            payload: None,
        }
    }

    fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn with_subresource(mut self, subresource: Option<&str>) -> Self {
        self.subresource = subresource.map(str::to_string);
        self
    }

    fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Whether this action has the given verb and resource. `"*"` matches
    /// any resource.
    #[must_use]
    pub fn matches(&self, verb: Verb, resource: &str) -> bool {
        self.verb == verb && (resource == "*" || self.resource == resource)
    }
}

/// Intercepts an action. Returning `None` passes it on to the next reactor
/// and finally to the in-memory store.
///
/// `Some(Ok(value))` is decoded as the call's return type: the object for
/// get, create, update and patch, an array of objects for list. The value
/// is ignored for delete, delete-collection and watch.
pub type Reaction = Arc<dyn Fn(&Action) -> Option<Result<Value, RegistryError>> + Send + Sync>;

struct Reactor {
    verb: Option<Verb>,
    resource: String,
    reaction: Reaction,
}

impl Reactor {
    fn handles(&self, action: &Action) -> bool {
        self.verb.is_none_or(|v| v == action.verb)
            && (self.resource == "*" || self.resource == action.resource)
    }
}

/// Action log and reactor chain shared by every client of a clientset.
#[derive(Default)]
struct Tracker {
    actions: Mutex<Vec<Action>>,
    reactors: Mutex<Vec<Reactor>>,
}

impl Tracker {
    /// Record `action` and run it through the reactor chain.
    fn invoke(&self, action: Action) -> Option<Result<Value, RegistryError>> {
        debug!(
            verb = %action.verb,
            resource = %action.resource,
            namespace = ?action.namespace,
            name = ?action.name,
            "Fake client call"
        );
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action.clone());
        let reactors = self.reactors.lock().unwrap_or_else(PoisonError::into_inner);
        reactors
            .iter()
            .filter(|r| r.handles(&action))
            .find_map(|r| (r.reaction)(&action))
    }
}

/// Test double for [`Clientset`](super::Clientset).
#[derive(Clone)]
pub struct FakeClientset {
    clusters: Arc<MemoryStorage<Cluster>>,
    dns_records: Arc<MemoryStorage<MultiClusterServiceDNSRecord>>,
    tracker: Arc<Tracker>,
    config: ClientConfig,
}

impl Default for FakeClientset {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClientset {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            clusters: Arc::new(MemoryStorage::new()),
            dns_records: Arc::new(MemoryStorage::new()),
            tracker: Arc::new(Tracker::default()),
            config,
        }
    }

    /// Seed the store with clusters without recording actions.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` on a duplicate name.
    pub async fn with_clusters(
        self,
        clusters: impl IntoIterator<Item = Cluster>,
    ) -> Result<Self, RegistryError> {
        for cluster in clusters {
            self.clusters.create(cluster).await?;
        }
        Ok(self)
    }

    /// Seed the store with DNS records without recording actions.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` on a duplicate name.
    pub async fn with_dns_records(
        self,
        records: impl IntoIterator<Item = MultiClusterServiceDNSRecord>,
    ) -> Result<Self, RegistryError> {
        for record in records {
            self.dns_records.create(record).await?;
        }
        Ok(self)
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.tracker
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_actions(&self) {
        self.tracker
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Put a reactor at the front of the chain. `verb: None` and
    /// `resource: "*"` match everything.
    pub fn prepend_reactor<F>(&self, verb: Option<Verb>, resource: &str, reaction: F)
    where
        F: Fn(&Action) -> Option<Result<Value, RegistryError>> + Send + Sync + 'static,
    {
        self.tracker
            .reactors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                0,
                Reactor {
                    verb,
                    resource: resource.to_string(),
                    reaction: Arc::new(reaction),
                },
            );
    }

    /// The store behind the cluster client.
    #[must_use]
    pub fn cluster_storage(&self) -> Arc<MemoryStorage<Cluster>> {
        Arc::clone(&self.clusters)
    }

    /// The store behind the DNS record clients.
    #[must_use]
    pub fn dns_record_storage(&self) -> Arc<MemoryStorage<MultiClusterServiceDNSRecord>> {
        Arc::clone(&self.dns_records)
    }
}

impl RegistryInterface for FakeClientset {
    fn clusters(&self) -> Box<dyn ResourceClient<Cluster>> {
        Box::new(FakeResourceClient::new(
            Arc::clone(&self.clusters),
            Arc::clone(&self.tracker),
            None,
        ))
    }

    fn multi_cluster_service_dns_records(
        &self,
        namespace: &str,
    ) -> Box<dyn ResourceClient<MultiClusterServiceDNSRecord>> {
        Box::new(FakeResourceClient::new(
            Arc::clone(&self.dns_records),
            Arc::clone(&self.tracker),
            Some(namespace),
        ))
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// [`ResourceClient`] over a [`MemoryStorage`], created by
/// [`FakeClientset`].
pub struct FakeResourceClient<K: RegistryKind> {
    storage: Arc<MemoryStorage<K>>,
    tracker: Arc<Tracker>,
    namespace: Option<String>,
}

impl<K: RegistryKind> FakeResourceClient<K> {
    fn new(storage: Arc<MemoryStorage<K>>, tracker: Arc<Tracker>, namespace: Option<&str>) -> Self {
        Self {
            storage,
            tracker,
            namespace: namespace.filter(|_| K::NAMESPACED).map(str::to_string),
        }
    }

    fn action(&self, verb: Verb) -> Action {
        Action::new::<K>(verb, self.namespace.as_deref())
    }

    /// Stamp the client's namespace on `obj`, rejecting a conflicting one.
    fn bind_namespace(&self, obj: &mut K) -> Result<(), RegistryError> {
        let Some(namespace) = self.namespace.as_deref() else {
            obj.meta_mut().namespace = None;
            return Ok(());
        };
        match obj.meta().namespace.as_deref() {
            Some(ns) if !ns.is_empty() && ns != namespace => Err(RegistryError::BadRequest(
                "the namespace of the provided object does not match the namespace sent on the request"
                    .to_string(),
            )),
            _ => {
                obj.meta_mut().namespace = Some(namespace.to_string());
                Ok(())
            }
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RegistryError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Replace the stored object's status with `obj`'s, keeping `obj`'s
    /// resource version for the compare-and-swap.
    async fn write_status(&self, obj: &K) -> Result<K, RegistryError> {
        let mut current = self
            .storage
            .get(self.namespace.as_deref(), &obj.name_any())
            .await?;
        current.copy_status_from(obj);
        if let Some(rv) = obj.resource_version().filter(|rv| !rv.is_empty()) {
            current.meta_mut().resource_version = Some(rv);
        }
        self.storage.update(current).await
    }
}

#[async_trait]
impl<K: RegistryKind> ResourceClient<K> for FakeResourceClient<K> {
    async fn get(&self, name: &str) -> Result<K, RegistryError> {
        if let Some(reaction) = self.tracker.invoke(self.action(Verb::Get).named(name)) {
            return Self::decode(reaction?);
        }
        self.storage.get(self.namespace.as_deref(), name).await
    }

    async fn list(&self, opts: &ListOptions) -> Result<ResourceList<K>, RegistryError> {
        if let Some(reaction) = self.tracker.invoke(self.action(Verb::List)) {
            let items: Vec<K> = Self::decode(reaction?)?;
            return Ok(items.into());
        }
        let predicate = SelectionPredicate::from_list_options(opts, object_meta_attrs::<K>)?;
        self.storage.list(self.namespace.as_deref(), &predicate).await
    }

    async fn watch(&self, opts: &WatchOptions) -> Result<WatchStream<K>, RegistryError> {
        if let Some(reaction) = self.tracker.invoke(self.action(Verb::Watch)) {
            reaction?;
        }
        let predicate = SelectionPredicate::from_watch_options(opts, object_meta_attrs::<K>)?;
        self.storage
            .watch(
                self.namespace.as_deref(),
                predicate,
                opts.resource_version.as_deref(),
            )
            .await
    }

    async fn create(&self, obj: &K, opts: &CreateOptions) -> Result<K, RegistryError> {
        let action = self
            .action(Verb::Create)
            .named(&obj.name_any())
            .with_payload(serde_json::to_value(obj).ok());
        if let Some(reaction) = self.tracker.invoke(action) {
            return Self::decode(reaction?);
        }

        let mut obj = obj.clone();
        self.bind_namespace(&mut obj)?;
        let meta = obj.meta_mut();
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            if let Some(base) = meta.generate_name.as_deref().filter(|g| !g.is_empty()) {
                meta.name = Some(generate_name(base));
            }
        }
        if opts.dry_run {
            return Ok(obj);
        }
        self.storage.create(obj).await
    }

    async fn update(&self, obj: &K, opts: &UpdateOptions) -> Result<K, RegistryError> {
        let action = self
            .action(Verb::Update)
            .named(&obj.name_any())
            .with_payload(serde_json::to_value(obj).ok());
        if let Some(reaction) = self.tracker.invoke(action) {
            return Self::decode(reaction?);
        }

        let mut obj = obj.clone();
        self.bind_namespace(&mut obj)?;
        if opts.dry_run {
            return Ok(obj);
        }
        self.storage.update(obj).await
    }

    async fn update_status(&self, obj: &K, opts: &UpdateOptions) -> Result<K, RegistryError> {
        let action = self
            .action(Verb::Update)
            .named(&obj.name_any())
            .with_subresource(Some(SUBRESOURCE_STATUS))
            .with_payload(serde_json::to_value(obj).ok());
        if let Some(reaction) = self.tracker.invoke(action) {
            return Self::decode(reaction?);
        }
        if opts.dry_run {
            return Ok(obj.clone());
        }
        self.write_status(obj).await
    }

    async fn delete(&self, name: &str, opts: &DeleteOptions) -> Result<DeleteOutcome<K>, RegistryError> {
        if let Some(reaction) = self.tracker.invoke(self.action(Verb::Delete).named(name)) {
            reaction?;
            return Ok(DeleteOutcome::Deleted);
        }
        if opts.dry_run {
            self.storage.get(self.namespace.as_deref(), name).await?;
            return Ok(DeleteOutcome::Deleted);
        }
        self.storage
            .delete(self.namespace.as_deref(), name, opts.preconditions.as_ref())
            .await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn delete_collection(
        &self,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<(), RegistryError> {
        if let Some(reaction) = self.tracker.invoke(self.action(Verb::DeleteCollection)) {
            return reaction.map(|_| ());
        }
        let predicate = SelectionPredicate {
            limit: None,
            continue_token: None,
            ..SelectionPredicate::from_list_options(list_opts, object_meta_attrs::<K>)?
        };
        let items = self.storage.list(self.namespace.as_deref(), &predicate).await?;
        if opts.dry_run {
            return Ok(());
        }
        let mut errors = Vec::new();
        for item in items {
            match self
                .storage
                .delete(
                    item.namespace().as_deref(),
                    &item.name_any(),
                    opts.preconditions.as_ref(),
                )
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => errors.push(e),
            }
        }
        match RegistryError::aggregate(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn patch(
        &self,
        name: &str,
        patch_type: PatchType,
        data: &Value,
        subresource: Option<&str>,
        opts: &PatchOptions,
    ) -> Result<K, RegistryError> {
        let action = self
            .action(Verb::Patch)
            .named(name)
            .with_subresource(subresource)
            .with_payload(Some(data.clone()));
        if let Some(reaction) = self.tracker.invoke(action) {
            return Self::decode(reaction?);
        }

        let current = self.storage.get(self.namespace.as_deref(), name).await?;
        let doc = serde_json::to_value(&current)?;
        let patched: K = Self::decode(apply_patch(&doc, patch_type, data, K::MERGE_KEYS)?)?;
        if patched.name_any() != name {
            return Err(RegistryError::BadRequest(format!(
                "patch may not change the object name from {name:?} to {:?}",
                patched.name_any()
            )));
        }
        if opts.dry_run {
            return Ok(patched);
        }
        match subresource {
            None => self.storage.update(patched).await,
            Some(SUBRESOURCE_STATUS) => self.write_status(&patched).await,
            Some(other) => Err(RegistryError::BadRequest(format!(
                "unsupported subresource {other:?}"
            ))),
        }
    }
}
