// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # cluster-registry - Cluster and Multicluster DNS Registry for Kubernetes
//!
//! Typed resources, server-side strategies, a generic object store and
//! typed clients for two API groups:
//!
//! - `clusterregistry.k8s.io/v1alpha1` `Cluster` (cluster-scoped): how to
//!   reach a member cluster's API server and its observed health
//! - `multiclusterdns.federation.k8s.io/v1alpha1`
//!   `MultiClusterServiceDNSRecord` (namespaced): DNS publication data for a
//!   service federated across clusters
//!
//! ## Modules
//!
//! - [`crd`] - Resource types and the [`crd::RegistryKind`] trait
//! - [`strategy`] - Per-kind create/update/status rules and validation
//! - [`registry`] - Generic store adapter and in-memory backing store
//! - [`client`] - Typed clients over a live API server, plus a fake
//! - [`selector`] - Label and field selector parsing and matching
//! - [`patch`] - JSON, merge and strategic merge patch application
//! - [`validation`] - Field error accumulation and name/label validators
//! - [`errors`] - API-status error type shared by every layer
//! - [`metrics`] - Prometheus request and watch metrics
//!
//! ## Example
//!
//! ```rust
//! use cluster_registry::crd::{Cluster, ClusterSpec};
//! use cluster_registry::options::{CreateOptions, ListOptions};
//! use cluster_registry::registry::ResourceStore;
//!
//! # async fn example() -> Result<(), cluster_registry::errors::RegistryError> {
//! let store = ResourceStore::<Cluster>::in_memory_clusters();
//! store
//!     .create(Cluster::new("cluster-s", ClusterSpec::default()), &CreateOptions::default())
//!     .await?;
//!
//! let clusters = store.list(None, &ListOptions::default()).await?;
//! assert_eq!(clusters.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod constants;
pub mod crd;
pub mod errors;
pub mod metrics;
pub mod options;
pub mod patch;
pub mod registry;
pub mod selector;
pub mod strategy;
pub mod validation;
