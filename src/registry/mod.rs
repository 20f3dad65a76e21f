// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic object store adapter and the backing store contract.
//!
//! [`ResourceStore`] implements the standard create/get/list/watch/update/
//! patch/delete verbs for any [`RegistryKind`]. It consults the kind's
//! [`RestStrategy`] before every write and delegates persistence to a
//! [`Storage`] implementation, so the same adapter serves the in-memory
//! [`MemoryStorage`](memory::MemoryStorage) and any other backend.
//!
//! # Write path
//!
//! 1. Load the current object (updates, patches and deletes)
//! 2. Check the submitted resource version against the stored one
//! 3. `prepare_for_create` / `prepare_for_update`
//! 4. `validate` / `validate_update`, rejecting with `Invalid` before storage is touched
//! 5. `canonicalize`
//! 6. Persist with compare-and-swap on the resource version
//!
//! Storage errors are returned unmodified and nothing is retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use cluster_registry::crd::{Cluster, ClusterSpec};
//! use cluster_registry::options::CreateOptions;
//! use cluster_registry::registry::ResourceStore;
//!
//! # async fn example() -> Result<(), cluster_registry::errors::RegistryError> {
//! let store = ResourceStore::<Cluster>::in_memory_clusters();
//! let created = store
//!     .create(Cluster::new("cluster-s", ClusterSpec::default()), &CreateOptions::default())
//!     .await?;
//! assert_eq!(created.metadata.generation, Some(1));
//! # Ok(())
//! # }
//! ```

pub mod memory;

use crate::constants::{
    FINALIZER_DELETE_DEPENDENTS, FINALIZER_ORPHAN_DEPENDENTS, GENERATE_NAME_ALPHABET,
    GENERATE_NAME_MAX_BASE_LENGTH, GENERATE_NAME_SUFFIX_LENGTH, SUBRESOURCE_STATUS,
};
use crate::crd::{Cluster, MultiClusterServiceDNSRecord, RegistryKind};
use crate::errors::RegistryError;
use crate::metrics;
use crate::options::{
    CreateOptions, DeleteOptions, DeleteOutcome, ListOptions, PatchOptions, PatchType,
    Preconditions, PropagationPolicy, ResourceList, UpdateOptions, WatchOptions, WatchStream,
};
use crate::patch::apply_patch;
use crate::selector::{FieldSelector, LabelSelector};
use crate::strategy::{
    object_meta_attrs, AttrsFn, ClusterStatusStrategy, ClusterStrategy, DnsRecordStatusStrategy,
    DnsRecordStrategy, RestStrategy,
};
use crate::validation::{FieldErrors, FieldPath};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use chrono::Utc;
use k8s_openapi::jiff::Timestamp;
use kube::{Resource, ResourceExt};
use memory::MemoryStorage;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Message returned when a write carries a stale resource version.
pub const OPTIMISTIC_LOCK_MESSAGE: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

// ============================================================================
// Backing store contract
// ============================================================================

/// Persistence backend for one resource kind.
///
/// Objects are addressed by `(namespace, name)`; cluster-scoped kinds always
/// pass `None`. Implementations own resource version assignment.
#[async_trait]
pub trait Storage<K: RegistryKind>: Send + Sync {
    /// Persist a new object. Fails with `AlreadyExists` on a name collision.
    async fn create(&self, obj: K) -> Result<K, RegistryError>;

    /// Fetch one object.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, RegistryError>;

    /// Objects matching `predicate`, in insertion order. `namespace: None`
    /// lists across all namespaces.
    async fn list(
        &self,
        namespace: Option<&str>,
        predicate: &SelectionPredicate<K>,
    ) -> Result<ResourceList<K>, RegistryError>;

    /// Stream changes to objects matching `predicate` after
    /// `resource_version`, or the current state followed by changes when no
    /// version is given.
    async fn watch(
        &self,
        namespace: Option<&str>,
        predicate: SelectionPredicate<K>,
        resource_version: Option<&str>,
    ) -> Result<WatchStream<K>, RegistryError>;

    /// Replace an existing object. When `obj` carries a resource version it
    /// must equal the stored one, otherwise the write fails with `Conflict`.
    async fn update(&self, obj: K) -> Result<K, RegistryError>;

    /// Remove an object, returning its final state.
    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        preconditions: Option<&Preconditions>,
    ) -> Result<K, RegistryError>;
}

/// Server-side filter handed to the backing store for List and Watch.
#[derive(Clone, Debug)]
pub struct SelectionPredicate<K> {
    pub label: LabelSelector,
    pub field: FieldSelector,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
    pub attrs: AttrsFn<K>,
}

impl<K: RegistryKind> SelectionPredicate<K> {
    /// A predicate matching every object.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            label: LabelSelector::everything(),
            field: FieldSelector::everything(),
            limit: None,
            continue_token: None,
            attrs: object_meta_attrs::<K>,
        }
    }

    /// Parse selectors and paging from list options.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if either selector is malformed.
    pub fn from_list_options(opts: &ListOptions, attrs: AttrsFn<K>) -> Result<Self, RegistryError> {
        Ok(Self {
            label: LabelSelector::parse_optional(opts.label_selector.as_deref())?,
            field: FieldSelector::parse_optional(opts.field_selector.as_deref())?,
            limit: opts.limit.filter(|l| *l > 0),
            continue_token: opts.continue_token.clone().filter(|t| !t.is_empty()),
            attrs,
        })
    }

    /// Parse selectors from watch options.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if either selector is malformed.
    pub fn from_watch_options(opts: &WatchOptions, attrs: AttrsFn<K>) -> Result<Self, RegistryError> {
        Ok(Self {
            label: LabelSelector::parse_optional(opts.label_selector.as_deref())?,
            field: FieldSelector::parse_optional(opts.field_selector.as_deref())?,
            limit: None,
            continue_token: None,
            attrs,
        })
    }

    /// Whether neither selector constrains anything.
    #[must_use]
    pub fn is_everything(&self) -> bool {
        self.label.is_empty() && self.field.is_empty()
    }

    #[must_use]
    pub fn matches(&self, obj: &K) -> bool {
        if self.is_everything() {
            return true;
        }
        let attrs = (self.attrs)(obj);
        self.label.matches(&attrs.labels) && self.field.matches(&attrs.fields)
    }
}

/// Check delete preconditions against the stored object.
///
/// # Errors
///
/// Returns `Conflict` when the uid or resource version does not match.
pub fn check_preconditions<K: RegistryKind>(
    obj: &K,
    preconditions: Option<&Preconditions>,
) -> Result<(), RegistryError> {
    let Some(preconditions) = preconditions else {
        return Ok(());
    };
    let meta = obj.meta();
    let name = obj.name_any();
    if let Some(uid) = preconditions.uid.as_deref() {
        let actual = meta.uid.as_deref().unwrap_or_default();
        if uid != actual {
            return Err(RegistryError::conflict(
                &K::qualified_resource(),
                &name,
                format!("Precondition failed: UID in precondition: {uid}, UID in object meta: {actual}"),
            ));
        }
    }
    if let Some(rv) = preconditions.resource_version.as_deref() {
        let actual = meta.resource_version.as_deref().unwrap_or_default();
        if rv != actual {
            return Err(RegistryError::conflict(
                &K::qualified_resource(),
                &name,
                format!(
                    "Precondition failed: ResourceVersion in precondition: {rv}, ResourceVersion in object meta: {actual}"
                ),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Generated names and uids
// ============================================================================

static GENERATION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_digest(seed: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    hasher.update(GENERATION_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Expand a `generateName` prefix into a full name.
///
/// The prefix is truncated so the result fits in a DNS-1123 label, then a
/// random suffix from the Kubernetes name alphabet is appended.
#[must_use]
pub fn generate_name(base: &str) -> String {
    let base: String = base.chars().take(GENERATE_NAME_MAX_BASE_LENGTH).collect();
    let digest = unique_digest(&base);
    let suffix: String = digest
        .iter()
        .take(GENERATE_NAME_SUFFIX_LENGTH)
        .map(|b| GENERATE_NAME_ALPHABET[usize::from(*b) % GENERATE_NAME_ALPHABET.len()] as char)
        .collect();
    format!("{base}{suffix}")
}

/// A new random object uid in canonical 8-4-4-4-12 form.
#[must_use]
pub fn generate_uid() -> String {
    let mut bytes = unique_digest("uid");
    // RFC 4122 version 4, variant 1
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes[..16].iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// ============================================================================
// Store adapter
// ============================================================================

/// Decrements the open-watch gauge when the stream is dropped.
struct WatchGuard(String);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        metrics::record_watch_stopped(&self.0);
    }
}

/// Standard REST verbs for one kind over a [`Storage`] backend.
pub struct ResourceStore<K: RegistryKind> {
    storage: Arc<dyn Storage<K>>,
    strategy: Arc<dyn RestStrategy<K>>,
    status_strategy: Arc<dyn RestStrategy<K>>,
}

impl<K: RegistryKind> Clone for ResourceStore<K> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            strategy: Arc::clone(&self.strategy),
            status_strategy: Arc::clone(&self.status_strategy),
        }
    }
}

impl ResourceStore<Cluster> {
    /// Cluster store over the given backend.
    pub fn clusters(storage: Arc<dyn Storage<Cluster>>) -> Self {
        Self::new(storage, ClusterStrategy, ClusterStatusStrategy)
    }

    /// Cluster store over a fresh [`MemoryStorage`].
    #[must_use]
    pub fn in_memory_clusters() -> Self {
        Self::clusters(Arc::new(MemoryStorage::new()))
    }
}

impl ResourceStore<MultiClusterServiceDNSRecord> {
    /// DNS record store over the given backend.
    pub fn dns_records(storage: Arc<dyn Storage<MultiClusterServiceDNSRecord>>) -> Self {
        Self::new(storage, DnsRecordStrategy, DnsRecordStatusStrategy)
    }

    /// DNS record store over a fresh [`MemoryStorage`].
    #[must_use]
    pub fn in_memory_dns_records() -> Self {
        Self::dns_records(Arc::new(MemoryStorage::new()))
    }
}

impl<K: RegistryKind> ResourceStore<K> {
    pub fn new(
        storage: Arc<dyn Storage<K>>,
        strategy: impl RestStrategy<K> + 'static,
        status_strategy: impl RestStrategy<K> + 'static,
    ) -> Self {
        Self {
            storage,
            strategy: Arc::new(strategy),
            status_strategy: Arc::new(status_strategy),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage<K>> {
        &self.storage
    }

    /// An empty object of this kind.
    #[must_use]
    pub fn new_object(&self) -> K {
        K::empty()
    }

    /// An empty list of this kind.
    #[must_use]
    pub fn new_list(&self) -> ResourceList<K> {
        ResourceList::default()
    }

    /// Build the server-side filter for a list request.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if either selector is malformed.
    pub fn predicate(&self, opts: &ListOptions) -> Result<SelectionPredicate<K>, RegistryError> {
        SelectionPredicate::from_list_options(opts, self.strategy.attrs_fn())
    }

    /// Time `fut`, record its outcome and log failures.
    async fn observe<T>(
        &self,
        verb: &str,
        fut: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        let start = Instant::now();
        let result = fut.await;
        let kind = K::kind(&());
        metrics::record_result(&kind, verb, &result, start.elapsed());
        match &result {
            Err(e @ RegistryError::Invalid { .. }) => {
                warn!(kind = %kind, verb, error = %e, "Rejected invalid object");
            }
            Err(e) => debug!(kind = %kind, verb, error = %e, "Request failed"),
            Ok(_) => {}
        }
        result
    }

    /// Resolve the namespace argument against the kind's scope.
    fn scope<'a>(&self, namespace: Option<&'a str>) -> Result<Option<&'a str>, RegistryError> {
        if !self.strategy.namespace_scoped() {
            return Ok(None);
        }
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => Ok(Some(ns)),
            None => Err(RegistryError::BadRequest(
                "namespace is required for this resource".to_string(),
            )),
        }
    }

    fn invalid(name: &str, errors: FieldErrors) -> RegistryError {
        RegistryError::invalid(&K::kind(&()), name, errors)
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    /// Create a new object.
    ///
    /// # Errors
    ///
    /// `Invalid` if validation fails, `AlreadyExists` on a name collision,
    /// or any storage error.
    pub async fn create(&self, obj: K, opts: &CreateOptions) -> Result<K, RegistryError> {
        self.observe("create", self.create_inner(obj, opts.dry_run))
            .await
    }

    async fn create_inner(&self, mut obj: K, dry_run: bool) -> Result<K, RegistryError> {
        let namespaced = self.strategy.namespace_scoped();
        let meta = obj.meta_mut();
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            if let Some(base) = meta.generate_name.as_deref().filter(|g| !g.is_empty()) {
                meta.name = Some(generate_name(base));
            }
        }
        if !namespaced {
            meta.namespace = None;
        }
        meta.deletion_timestamp = None;
        meta.deletion_grace_period_seconds = None;

        self.strategy.prepare_for_create(&mut obj);
        let errs = self.strategy.validate(&obj);
        if !errs.is_empty() {
            return Err(Self::invalid(&obj.name_any(), errs));
        }
        self.strategy.canonicalize(&mut obj);

        if dry_run {
            debug!(kind = %K::kind(&()), name = %obj.name_any(), "Dry-run create, not persisted");
            return Ok(obj);
        }
        let created = self.storage.create(obj).await?;
        info!(
            kind = %K::kind(&()),
            namespace = ?created.namespace(),
            name = %created.name_any(),
            resource_version = ?created.resource_version(),
            "Created object"
        );
        Ok(created)
    }

    // ------------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------------

    /// Fetch one object.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, RegistryError> {
        self.observe("get", async {
            let namespace = self.scope(namespace)?;
            debug!(kind = %K::kind(&()), namespace = ?namespace, name, "Getting object");
            self.storage.get(namespace, name).await
        })
        .await
    }

    /// List objects. `namespace: None` lists across all namespaces.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed selector or continue token.
    pub async fn list(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> Result<ResourceList<K>, RegistryError> {
        self.observe("list", async {
            let predicate = self.predicate(opts)?;
            let namespace = if self.strategy.namespace_scoped() {
                namespace.filter(|ns| !ns.is_empty())
            } else {
                None
            };
            let list = self.storage.list(namespace, &predicate).await?;
            debug!(
                kind = %K::kind(&()),
                namespace = ?namespace,
                count = list.len(),
                has_more = list.continue_token.is_some(),
                "Listed objects"
            );
            Ok(list)
        })
        .await
    }

    /// Watch objects. `namespace: None` watches across all namespaces.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed selector, `Expired` when resuming from a
    /// version no longer retained.
    pub async fn watch(
        &self,
        namespace: Option<&str>,
        opts: &WatchOptions,
    ) -> Result<WatchStream<K>, RegistryError> {
        self.observe("watch", async {
            let predicate = SelectionPredicate::from_watch_options(opts, self.strategy.attrs_fn())?;
            let namespace = if self.strategy.namespace_scoped() {
                namespace.filter(|ns| !ns.is_empty())
            } else {
                None
            };
            let stream = self
                .storage
                .watch(namespace, predicate, opts.resource_version.as_deref())
                .await?;

            let kind = K::kind(&()).to_string();
            metrics::record_watch_started(&kind);
            let guard = WatchGuard(kind);
            let stream = stream.map(move |event| {
                let _open = &guard;
                event
            });
            Ok(match opts.timeout_seconds {
                Some(secs) => stream
                    .take_until(tokio::time::sleep(Duration::from_secs(u64::from(secs))))
                    .boxed(),
                None => stream.boxed(),
            })
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Replace an object's spec and metadata. Status changes are ignored.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Conflict` for a stale resource version, `Invalid` if
    /// validation fails.
    pub async fn update(&self, obj: K, opts: &UpdateOptions) -> Result<K, RegistryError> {
        self.observe("update", async {
            let namespace = self.scope(obj.namespace().as_deref())?.map(str::to_string);
            let name = obj.name_any();
            self.update_inner(self.strategy.as_ref(), namespace.as_deref(), &name, obj, opts.dry_run)
                .await
        })
        .await
    }

    /// Replace an object's status. Spec, label and annotation changes are
    /// ignored.
    ///
    /// # Errors
    ///
    /// As for [`update`](Self::update).
    pub async fn update_status(&self, obj: K, opts: &UpdateOptions) -> Result<K, RegistryError> {
        self.observe("update_status", async {
            let namespace = self.scope(obj.namespace().as_deref())?.map(str::to_string);
            let name = obj.name_any();
            self.update_inner(
                self.status_strategy.as_ref(),
                namespace.as_deref(),
                &name,
                obj,
                opts.dry_run,
            )
            .await
        })
        .await
    }

    /// Shared update path. `namespace` and `name` address the stored object;
    /// `obj` is the desired state and may try to change them.
    async fn update_inner(
        &self,
        strategy: &dyn RestStrategy<K>,
        namespace: Option<&str>,
        name: &str,
        mut obj: K,
        dry_run: bool,
    ) -> Result<K, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::BadRequest("name is required".to_string()));
        }

        let old = match self.storage.get(namespace, name).await {
            Ok(old) => old,
            Err(e) if e.is_not_found() && strategy.allow_create_on_update() => {
                return self.create_inner(obj, dry_run).await;
            }
            Err(e) => return Err(e),
        };

        let requested = obj.meta().resource_version.clone().filter(|rv| !rv.is_empty());
        match requested {
            None if !strategy.allow_unconditional_update() => {
                let mut errs = FieldErrors::default();
                errs.required(
                    &FieldPath::new("metadata").child("resourceVersion"),
                    "must be specified for an update",
                );
                return Err(Self::invalid(name, errs));
            }
            None => obj.meta_mut().resource_version.clone_from(&old.meta().resource_version),
            Some(rv) if Some(rv.as_str()) != old.meta().resource_version.as_deref() => {
                return Err(RegistryError::conflict(
                    &K::qualified_resource(),
                    name,
                    OPTIMISTIC_LOCK_MESSAGE,
                ));
            }
            Some(_) => {}
        }

        {
            let old_meta = old.meta();
            let meta = obj.meta_mut();
            if meta.uid.as_deref().unwrap_or_default().is_empty() {
                meta.uid.clone_from(&old_meta.uid);
            }
            if old_meta.creation_timestamp.is_some() {
                meta.creation_timestamp.clone_from(&old_meta.creation_timestamp);
            }
            if old_meta.deletion_timestamp.is_some() {
                meta.deletion_timestamp.clone_from(&old_meta.deletion_timestamp);
                meta.deletion_grace_period_seconds = old_meta.deletion_grace_period_seconds;
            }
        }

        strategy.prepare_for_update(&mut obj, &old);
        let errs = strategy.validate_update(&obj, &old);
        if !errs.is_empty() {
            return Err(Self::invalid(name, errs));
        }
        strategy.canonicalize(&mut obj);

        if obj == old {
            debug!(kind = %K::kind(&()), name, "Update is a no-op");
            return Ok(old);
        }

        if obj.meta().deletion_timestamp.is_some() && obj.finalizers().is_empty() {
            if dry_run {
                return Ok(obj);
            }
            let preconditions = Preconditions {
                uid: None,
                resource_version: old.resource_version(),
            };
            let deleted = self.storage.delete(namespace, name, Some(&preconditions)).await?;
            info!(
                kind = %K::kind(&()),
                namespace = ?namespace,
                name,
                "Last finalizer removed, object deleted"
            );
            return Ok(deleted);
        }

        if dry_run {
            return Ok(obj);
        }
        let updated = self.storage.update(obj).await?;
        info!(
            kind = %K::kind(&()),
            namespace = ?namespace,
            name,
            resource_version = ?updated.resource_version(),
            "Updated object"
        );
        Ok(updated)
    }

    // ------------------------------------------------------------------------
    // Patch
    // ------------------------------------------------------------------------

    /// Apply a patch document to the stored object and write the result
    /// through the update path (or the status update path when
    /// `subresource` is `status`).
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed patch or unknown subresource, then as
    /// for [`update`](Self::update).
    pub async fn patch(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch_type: PatchType,
        patch: &Value,
        subresource: Option<&str>,
        opts: &PatchOptions,
    ) -> Result<K, RegistryError> {
        self.observe("patch", async {
            let namespace = self.scope(namespace)?;
            let strategy = match subresource {
                None => self.strategy.as_ref(),
                Some(SUBRESOURCE_STATUS) => self.status_strategy.as_ref(),
                Some(other) => {
                    return Err(RegistryError::BadRequest(format!(
                        "unsupported subresource {other:?}"
                    )));
                }
            };

            let current = self.storage.get(namespace, name).await?;
            let doc = serde_json::to_value(&current)?;
            let patched = apply_patch(&doc, patch_type, patch, K::MERGE_KEYS)?;
            let obj: K = serde_json::from_value(patched).map_err(|e| {
                RegistryError::BadRequest(format!("patched object is not a valid {}: {e}", K::kind(&())))
            })?;
            debug!(
                kind = %K::kind(&()),
                namespace = ?namespace,
                name,
                patch_type = ?patch_type,
                subresource = ?subresource,
                "Applying patch"
            );
            self.update_inner(strategy, namespace, name, obj, opts.dry_run)
                .await
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    /// Delete an object.
    ///
    /// Objects carrying finalizers (including the one added by an `Orphan`
    /// or `Foreground` propagation policy) are marked with a deletion
    /// timestamp and returned as [`DeleteOutcome::Pending`].
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Conflict` when a precondition fails.
    pub async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        opts: &DeleteOptions,
    ) -> Result<DeleteOutcome<K>, RegistryError> {
        self.observe("delete", async {
            let namespace = self.scope(namespace)?;
            self.delete_inner(namespace, name, opts).await
        })
        .await
    }

    async fn delete_inner(
        &self,
        namespace: Option<&str>,
        name: &str,
        opts: &DeleteOptions,
    ) -> Result<DeleteOutcome<K>, RegistryError> {
        let mut obj = self.storage.get(namespace, name).await?;
        check_preconditions(&obj, opts.preconditions.as_ref())?;

        let mut finalizers = obj.finalizers().to_vec();
        let (add, remove) = match opts.propagation_policy {
            Some(PropagationPolicy::Orphan) => {
                (Some(FINALIZER_ORPHAN_DEPENDENTS), vec![FINALIZER_DELETE_DEPENDENTS])
            }
            Some(PropagationPolicy::Foreground) => {
                (Some(FINALIZER_DELETE_DEPENDENTS), vec![FINALIZER_ORPHAN_DEPENDENTS])
            }
            Some(PropagationPolicy::Background) => (
                None,
                vec![FINALIZER_ORPHAN_DEPENDENTS, FINALIZER_DELETE_DEPENDENTS],
            ),
            None => (None, Vec::new()),
        };
        finalizers.retain(|f| !remove.contains(&f.as_str()));
        if let Some(add) = add {
            if !finalizers.iter().any(|f| f == add) {
                finalizers.push(add.to_string());
            }
        }

        if finalizers.is_empty() {
            if opts.dry_run {
                return Ok(DeleteOutcome::Deleted);
            }
            let preconditions = Preconditions {
                uid: None,
                resource_version: obj.resource_version(),
            };
            self.storage.delete(namespace, name, Some(&preconditions)).await?;
            info!(kind = %K::kind(&()), namespace = ?namespace, name, "Deleted object");
            return Ok(DeleteOutcome::Deleted);
        }

        let unchanged = obj.meta().deletion_timestamp.is_some() && finalizers == obj.finalizers();
        if unchanged {
            debug!(kind = %K::kind(&()), name, "Deletion already pending");
            return Ok(DeleteOutcome::Pending(obj));
        }

        let meta = obj.meta_mut();
        meta.finalizers = Some(finalizers);
        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(Time(Timestamp::now()));
            meta.deletion_grace_period_seconds = Some(0);
            meta.generation = Some(meta.generation.unwrap_or_default() + 1);
        }
        if opts.dry_run {
            return Ok(DeleteOutcome::Pending(obj));
        }
        let updated = self.storage.update(obj).await?;
        info!(
            kind = %K::kind(&()),
            namespace = ?namespace,
            name,
            finalizers = ?updated.finalizers(),
            "Object marked for deletion, waiting on finalizers"
        );
        Ok(DeleteOutcome::Pending(updated))
    }

    /// Delete every object matching `list_opts`.
    ///
    /// Objects that vanish concurrently are skipped; every other per-item
    /// failure is collected and returned together.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed selector, otherwise the aggregated
    /// per-item errors.
    pub async fn delete_collection(
        &self,
        namespace: Option<&str>,
        list_opts: &ListOptions,
        opts: &DeleteOptions,
    ) -> Result<(), RegistryError> {
        self.observe("delete_collection", async {
            let predicate = SelectionPredicate {
                limit: None,
                continue_token: None,
                ..self.predicate(list_opts)?
            };
            let namespace = if self.strategy.namespace_scoped() {
                namespace.filter(|ns| !ns.is_empty())
            } else {
                None
            };
            let items = self.storage.list(namespace, &predicate).await?;

            let mut errors = Vec::new();
            let total = items.len();
            for item in items {
                let name = item.name_any();
                let item_namespace = item.namespace();
                match self.delete_inner(item_namespace.as_deref(), &name, opts).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => errors.push(e),
                }
            }
            info!(
                kind = %K::kind(&()),
                namespace = ?namespace,
                total,
                failed = errors.len(),
                "Deleted collection"
            );
            match RegistryError::aggregate(errors) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
        .await
    }
}

#[cfg(test)]
mod mod_tests;
