// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the cluster registry.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `Cluster` resource
pub const CLUSTER_REGISTRY_GROUP: &str = "clusterregistry.k8s.io";

/// API group for the `MultiClusterServiceDNSRecord` resource
pub const MULTICLUSTER_DNS_GROUP: &str = "multiclusterdns.federation.k8s.io";

/// API version served for both resource kinds
pub const API_VERSION: &str = "v1alpha1";

/// Kind name for `Cluster` resource
pub const KIND_CLUSTER: &str = "Cluster";

/// Kind name for `MultiClusterServiceDNSRecord` resource
pub const KIND_MULTI_CLUSTER_SERVICE_DNS_RECORD: &str = "MultiClusterServiceDNSRecord";

/// Plural resource name for `Cluster`
pub const PLURAL_CLUSTERS: &str = "clusters";

/// Plural resource name for `MultiClusterServiceDNSRecord`
pub const PLURAL_MULTI_CLUSTER_SERVICE_DNS_RECORDS: &str = "multiclusterservicednsrecords";

/// Name of the status subresource
pub const SUBRESOURCE_STATUS: &str = "status";

// ============================================================================
// Cluster Condition Constants
// ============================================================================

/// Condition type reporting that a cluster is healthy and reachable
pub const CLUSTER_CONDITION_OK: &str = "Ok";

/// Condition type reporting that a cluster is unreachable
pub const CLUSTER_CONDITION_OFFLINE: &str = "Offline";

/// Valid values for a condition's `status` field
pub const CONDITION_STATUSES: &[&str] = &["True", "False", "Unknown"];

// ============================================================================
// Finalizer Constants
// ============================================================================

/// Finalizer added when a delete requests the orphan propagation policy
pub const FINALIZER_ORPHAN_DEPENDENTS: &str = "orphan";

/// Finalizer added when a delete requests the foreground propagation policy
pub const FINALIZER_DELETE_DEPENDENTS: &str = "foregroundDeletion";

// ============================================================================
// Validation Limits
// ============================================================================

/// Maximum length of a DNS-1123 label
pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;

/// Maximum length of a DNS-1123 subdomain
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

/// Maximum length of the name part of a qualified name (label keys, finalizers)
pub const QUALIFIED_NAME_MAX_LENGTH: usize = 63;

/// Maximum length of a label value
pub const LABEL_VALUE_MAX_LENGTH: usize = 63;

/// Maximum combined size of all annotation keys and values (256 KiB)
pub const TOTAL_ANNOTATION_SIZE_LIMIT_BYTES: usize = 256 * 1024;

/// Maximum length of `generateName` before the random suffix is appended
pub const GENERATE_NAME_MAX_BASE_LENGTH: usize = 58;

/// Length of the random suffix appended to `generateName`
pub const GENERATE_NAME_SUFFIX_LENGTH: usize = 5;

/// Alphabet used for generated name suffixes (no vowels, no confusable digits)
pub const GENERATE_NAME_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

// ============================================================================
// Storage Constants
// ============================================================================

/// Number of watch events retained by the in-memory store for resumption
pub const WATCH_HISTORY_CAPACITY: usize = 1000;

/// Capacity of the broadcast channel feeding live watchers
pub const WATCH_CHANNEL_CAPACITY: usize = 256;

/// Page size for paginated Kubernetes API list operations.
///
/// Balances memory usage with API call overhead.
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

// ============================================================================
// Environment Variables
// ============================================================================

/// Environment variable holding the default namespace for namespaced clients
pub const ENV_NAMESPACE: &str = "CLUSTER_REGISTRY_NAMESPACE";

/// Environment variable holding the field manager sent on writes
pub const ENV_FIELD_MANAGER: &str = "CLUSTER_REGISTRY_FIELD_MANAGER";

/// Environment variable holding the list page size
pub const ENV_PAGE_SIZE: &str = "CLUSTER_REGISTRY_PAGE_SIZE";

/// Default namespace when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default field manager name
pub const DEFAULT_FIELD_MANAGER: &str = "cluster-registry";
