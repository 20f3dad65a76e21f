// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed clients for the registry kinds.
//!
//! [`ResourceClient`] is the per-kind verb set shared by every client
//! implementation:
//!
//! - [`KubeResourceClient`](kube_client::KubeResourceClient) talks to an API
//!   server through `kube::Api`
//! - [`FakeResourceClient`](fake::FakeResourceClient) serves from an
//!   in-memory store and records every call
//!
//! Code that needs clients takes a [`RegistryInterface`] so tests can inject
//! a [`FakeClientset`](fake::FakeClientset) in place of a [`Clientset`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cluster_registry::client::{Clientset, RegistryInterface};
//! use cluster_registry::options::ListOptions;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let clientset = Clientset::try_default().await?;
//! let clusters = clientset.clusters().list(&ListOptions::default().labels("env=prod")).await?;
//! for cluster in clusters {
//!     println!("{}", kube::ResourceExt::name_any(&cluster));
//! }
//! # Ok(())
//! # }
//! ```

pub mod fake;
pub mod kube_client;

use crate::constants::{
    DEFAULT_FIELD_MANAGER, DEFAULT_NAMESPACE, ENV_FIELD_MANAGER, ENV_NAMESPACE, ENV_PAGE_SIZE,
    KUBE_LIST_PAGE_SIZE,
};
use crate::crd::{Cluster, MultiClusterServiceDNSRecord, RegistryKind};
use crate::errors::RegistryError;
use crate::options::{
    CreateOptions, DeleteOptions, DeleteOutcome, ListOptions, PatchOptions, PatchType,
    ResourceList, UpdateOptions, WatchOptions, WatchStream,
};
use async_trait::async_trait;
use kube_client::KubeResourceClient;
use serde_json::Value;
use tracing::{debug, warn};

/// Standard verbs for one kind, bound to a namespace where the kind is
/// namespaced.
#[async_trait]
pub trait ResourceClient<K: RegistryKind>: Send + Sync {
    /// Fetch one object by name.
    async fn get(&self, name: &str) -> Result<K, RegistryError>;

    /// One page of objects matching `opts`.
    async fn list(&self, opts: &ListOptions) -> Result<ResourceList<K>, RegistryError>;

    /// Stream changes to objects matching `opts`.
    async fn watch(&self, opts: &WatchOptions) -> Result<WatchStream<K>, RegistryError>;

    async fn create(&self, obj: &K, opts: &CreateOptions) -> Result<K, RegistryError>;

    async fn update(&self, obj: &K, opts: &UpdateOptions) -> Result<K, RegistryError>;

    /// Write only the status of `obj`.
    async fn update_status(&self, obj: &K, opts: &UpdateOptions) -> Result<K, RegistryError>;

    async fn delete(&self, name: &str, opts: &DeleteOptions) -> Result<DeleteOutcome<K>, RegistryError>;

    /// Delete every object matching `list_opts`.
    async fn delete_collection(
        &self,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<(), RegistryError>;

    /// Apply a patch document, to the status subresource when `subresource`
    /// is `Some("status")`.
    async fn patch(
        &self,
        name: &str,
        patch_type: PatchType,
        data: &Value,
        subresource: Option<&str>,
        opts: &PatchOptions,
    ) -> Result<K, RegistryError>;
}

/// List every object matching `opts`, following continue tokens.
///
/// # Errors
///
/// Returns the first error from any page.
pub async fn list_all<K: RegistryKind>(
    client: &dyn ResourceClient<K>,
    opts: &ListOptions,
    page_size: u32,
) -> Result<Vec<K>, RegistryError> {
    let mut opts = opts.clone().limit(page_size);
    let mut all_items = Vec::new();
    let mut page_count = 0;

    loop {
        page_count += 1;
        let page = client.list(&opts).await?;
        let item_count = page.len();
        all_items.extend(page.items);

        debug!(
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page"
        );

        match page.continue_token {
            Some(token) => opts.continue_token = Some(token),
            None => break,
        }
    }

    debug!(
        total_pages = page_count,
        total_items = all_items.len(),
        "Completed paginated list operation"
    );
    Ok(all_items)
}

// ============================================================================
// Configuration
// ============================================================================

/// Client-side settings, passed explicitly to every clientset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Namespace used when a caller does not name one.
    pub namespace: String,
    /// Field manager recorded on writes.
    pub field_manager: String,
    /// Page size for [`list_all`].
    pub page_size: u32,
    /// Send every write as a dry run.
    pub dry_run: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            page_size: KUBE_LIST_PAGE_SIZE,
            dry_run: false,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `CLUSTER_REGISTRY_NAMESPACE`,
    /// `CLUSTER_REGISTRY_FIELD_MANAGER` and `CLUSTER_REGISTRY_PAGE_SIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(namespace) = lookup(ENV_NAMESPACE).filter(|v| !v.is_empty()) {
            config.namespace = namespace;
        }
        if let Some(manager) = lookup(ENV_FIELD_MANAGER).filter(|v| !v.is_empty()) {
            config.field_manager = manager;
        }
        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            match raw.parse::<u32>() {
                Ok(size) if size > 0 => config.page_size = size,
                _ => warn!(
                    variable = ENV_PAGE_SIZE,
                    value = %raw,
                    default = KUBE_LIST_PAGE_SIZE,
                    "Ignoring invalid page size"
                ),
            }
        }
        config
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// ============================================================================
// Clientsets
// ============================================================================

/// Entry point to the typed clients of every registry kind.
pub trait RegistryInterface: Send + Sync {
    /// Client for cluster-scoped `Cluster` objects.
    fn clusters(&self) -> Box<dyn ResourceClient<Cluster>>;

    /// Client for `MultiClusterServiceDNSRecord` objects in `namespace`.
    fn multi_cluster_service_dns_records(
        &self,
        namespace: &str,
    ) -> Box<dyn ResourceClient<MultiClusterServiceDNSRecord>>;

    /// Settings shared by the clients.
    fn config(&self) -> &ClientConfig;
}

/// Clientset backed by a live API server.
#[derive(Clone)]
pub struct Clientset {
    client: kube::Client,
    config: ClientConfig,
}

impl Clientset {
    #[must_use]
    pub fn new(client: kube::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// Connect with the inferred kubeconfig or in-cluster config, reading
    /// settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if no usable configuration is found.
    pub async fn try_default() -> Result<Self, RegistryError> {
        let client = kube::Client::try_default()
            .await
            .map_err(RegistryError::Transport)?;
        Ok(Self::new(client, ClientConfig::from_env()))
    }

    /// The underlying kube client.
    #[must_use]
    pub fn client(&self) -> &kube::Client {
        &self.client
    }

    fn typed<K: RegistryKind>(&self, namespace: Option<&str>) -> KubeResourceClient<K> {
        KubeResourceClient::new(self.client.clone(), namespace, self.config.clone())
    }
}

impl RegistryInterface for Clientset {
    fn clusters(&self) -> Box<dyn ResourceClient<Cluster>> {
        Box::new(self.typed::<Cluster>(None))
    }

    fn multi_cluster_service_dns_records(
        &self,
        namespace: &str,
    ) -> Box<dyn ResourceClient<MultiClusterServiceDNSRecord>> {
        Box::new(self.typed::<MultiClusterServiceDNSRecord>(Some(namespace)))
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }
}
