// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) served by the registry.
//!
//! # Resource Types
//!
//! - [`Cluster`] - A member cluster known to the registry (cluster-scoped)
//! - [`MultiClusterServiceDNSRecord`] - DNS publication state of a service
//!   federated across clusters (namespaced)
//!
//! Both kinds separate `spec` from `status`, so both expose a status
//! subresource. The [`RegistryKind`] trait gives the generic store, the
//! strategies and the clients the per-kind hooks they need without any
//! process-wide type registry.
//!
//! # Example: Creating a Cluster
//!
//! ```rust,no_run
//! use cluster_registry::crd::{Cluster, ClusterSpec, KubernetesApiEndpoints, ServerAddressByClientCidr};
//!
//! let cluster = Cluster::new(
//!     "cluster-s",
//!     ClusterSpec {
//!         kubernetes_api_endpoints: Some(KubernetesApiEndpoints {
//!             server_endpoints: Some(vec![ServerAddressByClientCidr {
//!                 client_cidr: "0.0.0.0/0".to_string(),
//!                 server_address: "10.0.0.1:6443".to_string(),
//!             }]),
//!             ca_bundle: None,
//!         }),
//!         auth_info: None,
//!         cloud_provider: None,
//!     },
//! );
//! ```

use k8s_openapi::api::core::v1::LoadBalancerStatus;
use kube::{Api, Client, CustomResource, Resource};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Per-kind hooks used by the generic registry machinery.
///
/// Implemented for every kind the registry serves. The associated constants
/// replace the scheme tables a generated clientset would consult at runtime.
pub trait RegistryKind:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Whether objects of this kind live inside a namespace.
    const NAMESPACED: bool;

    /// Strategic merge keys as `(list field name, merge key)` pairs.
    const MERGE_KEYS: &'static [(&'static str, &'static str)] = &[];

    /// An empty object, used as a response container.
    fn empty() -> Self;

    /// Drop the status block entirely.
    fn clear_status(&mut self);

    /// Replace this object's status with a copy of `other`'s.
    fn copy_status_from(&mut self, other: &Self);

    /// Replace this object's spec with a copy of `other`'s.
    fn copy_spec_from(&mut self, other: &Self);

    /// Whether the specs of two objects are equal.
    fn spec_eq(&self, other: &Self) -> bool;

    /// Typed API handle for this kind. Cluster-scoped kinds ignore
    /// `namespace`; namespaced kinds address all namespaces when it is `None`.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// `<plural>.<group>`, the resource name used in error messages.
    fn qualified_resource() -> String {
        format!("{}.{}", Self::plural(&()), Self::group(&()))
    }
}

// ============================================================================
// Cluster
// ============================================================================

/// Server address reachable from clients in a given network range.
///
/// A client picks the entry whose `clientCIDR` most specifically matches its
/// own address.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerAddressByClientCidr {
    /// CIDR of the clients that should use `serverAddress` (e.g. `0.0.0.0/0`).
    #[serde(rename = "clientCIDR")]
    pub client_cidr: String,

    /// Address of the API server, `host` or `host:port`.
    #[schemars(length(min = 1))]
    pub server_address: String,
}

/// How to reach a cluster's Kubernetes API server.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesApiEndpoints {
    /// Server addresses keyed by client CIDR.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_endpoints: Option<Vec<ServerAddressByClientCidr>>,

    /// Base64-encoded PEM bundle of the API server's certificate authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
}

/// Reference to an object holding authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviderReference {
    /// Kind of the referenced object (e.g. `Secret`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the referenced object.
    pub name: String,

    /// Namespace of the referenced object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Authentication information for a cluster.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    /// Deprecated per-user credentials. Must not be set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthProviderReference>,

    /// Credentials used by controllers acting on the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<AuthProviderReference>,
}

/// Cloud provider hosting the cluster.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct CloudProvider {
    /// Provider name (e.g. `gce`, `aws`, `openstack`).
    pub name: String,
}

/// Observed condition of a cluster.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Condition type: `Ok` or `Offline`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Last time the condition was probed (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `Cluster` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ClusterCondition>>,

    /// Failure-domain zones the cluster's nodes run in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,

    /// Failure-domain region the cluster runs in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// `Cluster` describes a Kubernetes cluster registered with the registry.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: clusterregistry.k8s.io/v1alpha1
/// kind: Cluster
/// metadata:
///   name: cluster-s
///   labels:
///     env: prod
/// spec:
///   kubernetesApiEndpoints:
///     serverEndpoints:
///       - clientCIDR: 0.0.0.0/0
///         serverAddress: 10.0.0.1:6443
///   authInfo:
///     controller:
///       kind: Secret
///       name: cluster-s-credentials
///       namespace: registry-system
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "clusterregistry.k8s.io",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    derive = "PartialEq",
    doc = "Cluster contains information about a Kubernetes cluster: how to reach its API server, which credentials controllers use for it, and its observed health."
)]
#[kube(status = "ClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Endpoints of the cluster's Kubernetes API server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_api_endpoints: Option<KubernetesApiEndpoints>,

    /// Authentication information for the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<AuthInfo>,

    /// Cloud provider hosting the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<CloudProvider>,
}

impl RegistryKind for Cluster {
    const NAMESPACED: bool = false;
    const MERGE_KEYS: &'static [(&'static str, &'static str)] =
        &[("serverEndpoints", "clientCIDR"), ("conditions", "type")];

    fn empty() -> Self {
        Cluster::new("", ClusterSpec::default())
    }

    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status.clone_from(&other.status);
    }

    fn copy_spec_from(&mut self, other: &Self) {
        self.spec.clone_from(&other.spec);
    }

    fn spec_eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

// ============================================================================
// MultiClusterServiceDNSRecord
// ============================================================================

/// DNS publication data for one member cluster of a federated service.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDns {
    /// Name of the member cluster.
    pub cluster: String,

    /// Zones of the cluster's nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,

    /// Region of the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Load balancer ingress points of the service in this cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerStatus>,
}

/// `MultiClusterServiceDNSRecord` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct MultiClusterServiceDNSRecordStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<ClusterDns>>,
}

/// `MultiClusterServiceDNSRecord` publishes a federated service in DNS.
///
/// The object's name is the name of the service it publishes.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: multiclusterdns.federation.k8s.io/v1alpha1
/// kind: MultiClusterServiceDNSRecord
/// metadata:
///   name: nginx
///   namespace: web
/// spec:
///   federationName: galactic
///   dnsSuffix: example.com
///   recordTTL: 300
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "multiclusterdns.federation.k8s.io",
    version = "v1alpha1",
    kind = "MultiClusterServiceDNSRecord",
    plural = "multiclusterservicednsrecords",
    namespaced,
    derive = "PartialEq",
    doc = "MultiClusterServiceDNSRecord describes the DNS records published for a service federated across member clusters."
)]
#[kube(status = "MultiClusterServiceDNSRecordStatus")]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterServiceDNSRecordSpec {
    /// Name of the federation the service belongs to.
    #[schemars(length(min = 1))]
    pub federation_name: String,

    /// Suffix appended to generated DNS names (e.g. `example.com`). A
    /// trailing dot is allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(regex(
        pattern = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*\.?$"
    ))]
    pub dns_suffix: Option<String>,

    /// TTL in seconds for the published records.
    #[serde(rename = "recordTTL", skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 2_147_483_647))]
    pub record_ttl: Option<i64>,
}

impl RegistryKind for MultiClusterServiceDNSRecord {
    const NAMESPACED: bool = true;
    const MERGE_KEYS: &'static [(&'static str, &'static str)] = &[("dns", "cluster")];

    fn empty() -> Self {
        MultiClusterServiceDNSRecord::new("", MultiClusterServiceDNSRecordSpec::default())
    }

    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status.clone_from(&other.status);
    }

    fn copy_spec_from(&mut self, other: &Self) {
        self.spec.clone_from(&other.spec);
    }

    fn spec_eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
