// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ResourceClient`] over a live API server.
//!
//! Request options are converted to `kube::api` parameters, selectors travel
//! as their canonical query strings, and every `kube::Error` is translated
//! with [`RegistryError::from_kube`].

use super::{ClientConfig, ResourceClient};
use crate::crd::RegistryKind;
use crate::errors::RegistryError;
use crate::metrics;
use crate::options::{
    CreateOptions, DeleteOptions, DeleteOutcome, ListOptions, PatchOptions, PatchType,
    PropagationPolicy, ResourceList, UpdateOptions, WatchEvent, WatchOptions, WatchStream,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use tracing::debug;

/// Longest server-side watch timeout the API server accepts.
const MAX_WATCH_TIMEOUT_SECS: u32 = 290;

/// Typed client for one kind, bound to a namespace for namespaced kinds.
pub struct KubeResourceClient<K: RegistryKind> {
    api: Api<K>,
    namespace: Option<String>,
    config: ClientConfig,
}

impl<K: RegistryKind> Clone for KubeResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            namespace: self.namespace.clone(),
            config: self.config.clone(),
        }
    }
}

impl<K: RegistryKind> KubeResourceClient<K> {
    /// `namespace` is ignored for cluster-scoped kinds.
    #[must_use]
    pub fn new(client: Client, namespace: Option<&str>, config: ClientConfig) -> Self {
        let namespace = namespace.filter(|_| K::NAMESPACED).map(str::to_string);
        Self {
            api: K::api(client, namespace.as_deref()),
            namespace,
            config,
        }
    }

    fn map_err(name: &str) -> impl Fn(kube::Error) -> RegistryError + '_ {
        move |e| RegistryError::from_kube(e, &K::qualified_resource(), name)
    }

    async fn observe<T>(
        &self,
        verb: &str,
        name: &str,
        fut: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        let start = Instant::now();
        let result = fut.await;
        metrics::record_result(&K::kind(&()), verb, &result, start.elapsed());
        if let Err(e) = &result {
            debug!(
                kind = %K::kind(&()),
                namespace = ?self.namespace,
                name,
                verb,
                error = %e,
                "API request failed"
            );
        }
        result
    }

    fn field_manager(&self, requested: Option<&String>) -> Option<String> {
        Some(requested.cloned().unwrap_or_else(|| self.config.field_manager.clone()))
    }

    fn post_params(&self, dry_run: bool, field_manager: Option<&String>) -> PostParams {
        PostParams {
            dry_run: dry_run || self.config.dry_run,
            field_manager: self.field_manager(field_manager),
        }
    }

    fn patch_params(&self, dry_run: bool, field_manager: Option<&String>) -> PatchParams {
        PatchParams {
            dry_run: dry_run || self.config.dry_run,
            field_manager: self.field_manager(field_manager),
            ..PatchParams::default()
        }
    }

    fn delete_params(&self, opts: &DeleteOptions) -> DeleteParams {
        DeleteParams {
            dry_run: opts.dry_run || self.config.dry_run,
            grace_period_seconds: opts.grace_period_seconds,
            propagation_policy: opts.propagation_policy.map(|p| match p {
                PropagationPolicy::Orphan => kube::api::PropagationPolicy::Orphan,
                PropagationPolicy::Background => kube::api::PropagationPolicy::Background,
                PropagationPolicy::Foreground => kube::api::PropagationPolicy::Foreground,
            }),
            preconditions: opts.preconditions.as_ref().map(|p| kube::api::Preconditions {
                resource_version: p.resource_version.clone(),
                uid: p.uid.clone(),
            }),
        }
    }
}

/// Convert list options to kube list parameters.
#[must_use]
pub fn list_params(opts: &ListOptions) -> ListParams {
    let mut params = ListParams::default();
    if let Some(labels) = opts.label_selector.as_deref().filter(|s| !s.is_empty()) {
        params = params.labels(labels);
    }
    if let Some(fields) = opts.field_selector.as_deref().filter(|s| !s.is_empty()) {
        params = params.fields(fields);
    }
    if let Some(limit) = opts.limit.filter(|l| *l > 0) {
        params = params.limit(limit);
    }
    if let Some(token) = opts.continue_token.as_deref().filter(|t| !t.is_empty()) {
        params = params.continue_token(token);
    }
    params
}

/// Convert watch options to kube watch parameters.
#[must_use]
pub fn watch_params(opts: &WatchOptions) -> WatchParams {
    let mut params = WatchParams::default();
    if let Some(labels) = opts.label_selector.as_deref().filter(|s| !s.is_empty()) {
        params = params.labels(labels);
    }
    if let Some(fields) = opts.field_selector.as_deref().filter(|s| !s.is_empty()) {
        params = params.fields(fields);
    }
    if let Some(timeout) = opts.timeout_seconds {
        params = params.timeout(timeout.min(MAX_WATCH_TIMEOUT_SECS));
    }
    params
}

#[async_trait]
impl<K: RegistryKind> ResourceClient<K> for KubeResourceClient<K> {
    async fn get(&self, name: &str) -> Result<K, RegistryError> {
        self.observe("get", name, async {
            self.api.get(name).await.map_err(Self::map_err(name))
        })
        .await
    }

    async fn list(&self, opts: &ListOptions) -> Result<ResourceList<K>, RegistryError> {
        self.observe("list", "", async {
            let list = self
                .api
                .list(&list_params(opts))
                .await
                .map_err(Self::map_err(""))?;
            debug!(
                kind = %K::kind(&()),
                namespace = ?self.namespace,
                count = list.items.len(),
                "Listed objects from API server"
            );
            Ok(ResourceList {
                items: list.items,
                resource_version: list.metadata.resource_version,
                continue_token: list.metadata.continue_.filter(|t| !t.is_empty()),
            })
        })
        .await
    }

    async fn watch(&self, opts: &WatchOptions) -> Result<WatchStream<K>, RegistryError> {
        self.observe("watch", "", async {
            let version = opts
                .resource_version
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0".to_string());
            let stream = self
                .api
                .watch(&watch_params(opts), &version)
                .await
                .map_err(Self::map_err(""))?;

            let kind = K::qualified_resource();
            let stream = stream
                .map_err(move |e| RegistryError::from_kube(e, &kind, ""))
                .and_then(|event| async move {
                    match event {
                        kube::core::WatchEvent::Added(obj) => Ok(WatchEvent::Added(obj)),
                        kube::core::WatchEvent::Modified(obj) => Ok(WatchEvent::Modified(obj)),
                        kube::core::WatchEvent::Deleted(obj) => Ok(WatchEvent::Deleted(obj)),
                        kube::core::WatchEvent::Bookmark(bookmark) => {
                            Ok(WatchEvent::Bookmark(bookmark.metadata.resource_version))
                        }
                        kube::core::WatchEvent::Error(resp) => Err(RegistryError::from_kube(
                            kube::Error::Api(resp),
                            &K::qualified_resource(),
                            "",
                        )),
                    }
                });
            Ok(stream.boxed())
        })
        .await
    }

    async fn create(&self, obj: &K, opts: &CreateOptions) -> Result<K, RegistryError> {
        let name = obj.name_any();
        self.observe("create", &name, async {
            let params = self.post_params(opts.dry_run, opts.field_manager.as_ref());
            self.api
                .create(&params, obj)
                .await
                .map_err(Self::map_err(&name))
        })
        .await
    }

    async fn update(&self, obj: &K, opts: &UpdateOptions) -> Result<K, RegistryError> {
        let name = obj.name_any();
        self.observe("update", &name, async {
            let params = self.post_params(opts.dry_run, opts.field_manager.as_ref());
            self.api
                .replace(&name, &params, obj)
                .await
                .map_err(Self::map_err(&name))
        })
        .await
    }

    async fn update_status(&self, obj: &K, opts: &UpdateOptions) -> Result<K, RegistryError> {
        let name = obj.name_any();
        self.observe("update_status", &name, async {
            let params = self.post_params(opts.dry_run, opts.field_manager.as_ref());
            self.api
                .replace_status(&name, &params, obj)
                .await
                .map_err(Self::map_err(&name))
        })
        .await
    }

    async fn delete(&self, name: &str, opts: &DeleteOptions) -> Result<DeleteOutcome<K>, RegistryError> {
        self.observe("delete", name, async {
            let result = self
                .api
                .delete(name, &self.delete_params(opts))
                .await
                .map_err(Self::map_err(name))?;
            Ok(match result.left() {
                Some(obj)
                    if obj.meta().deletion_timestamp.is_some() && !obj.finalizers().is_empty() =>
                {
                    DeleteOutcome::Pending(obj)
                }
                _ => DeleteOutcome::Deleted,
            })
        })
        .await
    }

    async fn delete_collection(
        &self,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<(), RegistryError> {
        self.observe("delete_collection", "", async {
            self.api
                .delete_collection(&self.delete_params(opts), &list_params(list_opts))
                .await
                .map(|_| ())
                .map_err(Self::map_err(""))
        })
        .await
    }

    async fn patch(
        &self,
        name: &str,
        patch_type: PatchType,
        data: &Value,
        subresource: Option<&str>,
        opts: &PatchOptions,
    ) -> Result<K, RegistryError> {
        self.observe("patch", name, async {
            let patch: Patch<&Value> = match patch_type {
                PatchType::Json => Patch::Json(serde_json::from_value(data.clone()).map_err(|e| {
                    RegistryError::BadRequest(format!("malformed JSON patch: {e}"))
                })?),
                PatchType::Merge => Patch::Merge(data),
                PatchType::Strategic => Patch::Strategic(data),
            };
            let params = self.patch_params(opts.dry_run, opts.field_manager.as_ref());
            debug!(
                kind = %K::kind(&()),
                namespace = ?self.namespace,
                name,
                content_type = patch_type.content_type(),
                subresource = ?subresource,
                "Sending patch"
            );
            match subresource {
                None => self.api.patch(name, &params, &patch).await,
                Some(sub) => self.api.patch_subresource(sub, name, &params, &patch).await,
            }
            .map_err(Self::map_err(name))
        })
        .await
    }
}

#[cfg(test)]
#[path = "kube_client_tests.rs"]
mod kube_client_tests;
