// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Create/update/delete rules for each resource kind.
//!
//! A [`RestStrategy`] is consulted by the store adapter before anything is
//! persisted. It prepares incoming objects (clearing fields the caller may
//! not set), validates them, and canonicalizes them. Each kind has two
//! strategies: one for the main resource, which ignores status changes, and
//! one for the `status` subresource, which ignores spec changes.
//!
//! `validate` and `validate_update` never mutate their inputs and always
//! report every violation they find.

use crate::constants::{CLUSTER_CONDITION_OFFLINE, CLUSTER_CONDITION_OK, CONDITION_STATUSES};
use crate::crd::{
    Cluster, ClusterSpec, ClusterStatus, MultiClusterServiceDNSRecord,
    MultiClusterServiceDNSRecordSpec, MultiClusterServiceDNSRecordStatus, RegistryKind,
};
use crate::validation::{
    validate_cidr, validate_dns1123_label, validate_dns1123_subdomain, validate_object_meta,
    validate_object_meta_update, FieldErrors, FieldPath,
};
use base64::Engine;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Attributes a selector can match on: labels plus selectable fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub labels: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

/// Function extracting selectable attributes from an object.
pub type AttrsFn<K> = fn(&K) -> ObjectAttrs;

/// Labels plus `metadata.name` and `metadata.namespace` (when namespaced).
#[must_use]
pub fn object_meta_attrs<K: RegistryKind>(obj: &K) -> ObjectAttrs {
    let mut fields = BTreeMap::from([("metadata.name".to_string(), obj.name_any())]);
    if K::NAMESPACED {
        fields.insert(
            "metadata.namespace".to_string(),
            obj.namespace().unwrap_or_default(),
        );
    }
    ObjectAttrs {
        labels: obj.labels().clone(),
        fields,
    }
}

/// Validation and admission rules for one resource kind.
pub trait RestStrategy<K: RegistryKind>: Send + Sync {
    fn namespace_scoped(&self) -> bool {
        K::NAMESPACED
    }

    /// Whether an update of a missing object creates it.
    fn allow_create_on_update(&self) -> bool {
        false
    }

    /// Whether an update without a resource version is accepted.
    fn allow_unconditional_update(&self) -> bool {
        true
    }

    /// Reset fields the caller may not set on create.
    fn prepare_for_create(&self, obj: &mut K);

    /// Carry over fields the caller may not change from `old`.
    fn prepare_for_update(&self, new: &mut K, old: &K);

    /// All problems with `obj` as a new object.
    fn validate(&self, obj: &K) -> FieldErrors;

    /// All problems with replacing `old` by `new`.
    fn validate_update(&self, new: &K, old: &K) -> FieldErrors;

    /// Normalize an object after validation.
    fn canonicalize(&self, _obj: &mut K) {}

    /// Attribute extraction used for selector filtering.
    fn attrs_fn(&self) -> AttrsFn<K> {
        object_meta_attrs::<K>
    }
}

/// Spec-side update preparation shared by every kind: status is kept from
/// the stored object and generation advances only when the spec changes.
fn prepare_spec_update<K: RegistryKind>(new: &mut K, old: &K) {
    new.copy_status_from(old);
    let generation = old.meta().generation.unwrap_or(1);
    new.meta_mut().generation = Some(if new.spec_eq(old) {
        generation
    } else {
        generation + 1
    });
}

/// Status-side update preparation: spec and all metadata except the
/// resource version are kept from the stored object.
fn prepare_status_update<K: RegistryKind>(new: &mut K, old: &K) {
    new.copy_spec_from(old);
    let resource_version = new.meta_mut().resource_version.take();
    *new.meta_mut() = old.meta().clone();
    new.meta_mut().resource_version = resource_version;
}

fn prepare_create<K: RegistryKind>(obj: &mut K) {
    obj.clear_status();
    obj.meta_mut().generation = Some(1);
}

// ============================================================================
// Cluster
// ============================================================================

/// Strategy for the `Cluster` resource.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterStrategy;

/// Strategy for the `Cluster` status subresource.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterStatusStrategy;

/// Validate a `Cluster` as a new object.
#[must_use]
pub fn validate_cluster(cluster: &Cluster) -> FieldErrors {
    let mut errs = validate_object_meta(
        &cluster.metadata,
        false,
        validate_dns1123_subdomain,
        &FieldPath::new("metadata"),
    );
    errs.extend(validate_cluster_spec(&cluster.spec, &FieldPath::new("spec")));
    errs
}

/// Validate a `Cluster` spec.
#[must_use]
pub fn validate_cluster_spec(spec: &ClusterSpec, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();

    if let Some(auth) = &spec.auth_info {
        let auth_path = path.child("authInfo");
        if auth.user.is_some() {
            errs.forbidden(
                &auth_path.child("user"),
                "user is deprecated and must not be set",
            );
        }
        if let Some(controller) = &auth.controller {
            if controller.name.is_empty() {
                errs.required(&auth_path.child("controller").child("name"), "");
            }
        }
    }

    if let Some(endpoints) = &spec.kubernetes_api_endpoints {
        let endpoints_path = path.child("kubernetesApiEndpoints");
        let server_path = endpoints_path.child("serverEndpoints");
        let mut seen = HashSet::new();
        for (i, endpoint) in endpoints.server_endpoints.iter().flatten().enumerate() {
            let item = server_path.index(i);
            for msg in validate_cidr(&endpoint.client_cidr) {
                errs.invalid(&item.child("clientCIDR"), endpoint.client_cidr.as_str(), msg);
            }
            if !seen.insert(endpoint.client_cidr.as_str()) {
                errs.duplicate(&item.child("clientCIDR"), endpoint.client_cidr.as_str());
            }
            if endpoint.server_address.trim().is_empty() {
                errs.required(&item.child("serverAddress"), "");
            }
        }
        if let Some(ca_bundle) = &endpoints.ca_bundle {
            if base64::engine::general_purpose::STANDARD
                .decode(ca_bundle)
                .is_err()
            {
                errs.invalid(
                    &endpoints_path.child("caBundle"),
                    "<redacted>",
                    "must be base64 encoded",
                );
            }
        }
    }

    if let Some(provider) = &spec.cloud_provider {
        if provider.name.is_empty() {
            errs.required(&path.child("cloudProvider").child("name"), "");
        }
    }

    errs
}

/// Validate a `Cluster` status block.
#[must_use]
pub fn validate_cluster_status(status: Option<&ClusterStatus>, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();
    let Some(status) = status else {
        return errs;
    };

    let conditions_path = path.child("conditions");
    let mut seen = HashSet::new();
    for (i, condition) in status.conditions.iter().flatten().enumerate() {
        let item = conditions_path.index(i);
        let supported = [CLUSTER_CONDITION_OK, CLUSTER_CONDITION_OFFLINE];
        if !supported.contains(&condition.r#type.as_str()) {
            errs.not_supported(&item.child("type"), condition.r#type.as_str(), &supported);
        }
        if !seen.insert(condition.r#type.as_str()) {
            errs.duplicate(&item.child("type"), condition.r#type.as_str());
        }
        if !CONDITION_STATUSES.contains(&condition.status.as_str()) {
            errs.not_supported(&item.child("status"), condition.status.as_str(), CONDITION_STATUSES);
        }
        for (field, value) in [
            ("lastHeartbeatTime", &condition.last_heartbeat_time),
            ("lastTransitionTime", &condition.last_transition_time),
        ] {
            if let Some(ts) = value {
                if chrono::DateTime::parse_from_rfc3339(ts).is_err() {
                    errs.invalid(&item.child(field), ts.as_str(), "must be an RFC3339 timestamp");
                }
            }
        }
    }
    errs
}

impl RestStrategy<Cluster> for ClusterStrategy {
    fn prepare_for_create(&self, obj: &mut Cluster) {
        prepare_create(obj);
    }

    fn prepare_for_update(&self, new: &mut Cluster, old: &Cluster) {
        prepare_spec_update(new, old);
    }

    fn validate(&self, obj: &Cluster) -> FieldErrors {
        validate_cluster(obj)
    }

    fn validate_update(&self, new: &Cluster, old: &Cluster) -> FieldErrors {
        let mut errs = validate_object_meta_update(
            &new.metadata,
            &old.metadata,
            &FieldPath::new("metadata"),
        );
        errs.extend(validate_cluster(new));
        errs
    }
}

impl RestStrategy<Cluster> for ClusterStatusStrategy {
    fn prepare_for_create(&self, obj: &mut Cluster) {
        prepare_create(obj);
    }

    fn prepare_for_update(&self, new: &mut Cluster, old: &Cluster) {
        prepare_status_update(new, old);
    }

    fn validate(&self, obj: &Cluster) -> FieldErrors {
        validate_cluster(obj)
    }

    fn validate_update(&self, new: &Cluster, old: &Cluster) -> FieldErrors {
        let mut errs = validate_object_meta_update(
            &new.metadata,
            &old.metadata,
            &FieldPath::new("metadata"),
        );
        errs.extend(validate_cluster_status(
            new.status.as_ref(),
            &FieldPath::new("status"),
        ));
        errs
    }

    fn canonicalize(&self, obj: &mut Cluster) {
        if let Some(zones) = obj.status.as_mut().and_then(|s| s.zones.as_mut()) {
            let unique: BTreeSet<String> = zones.drain(..).collect();
            zones.extend(unique);
        }
    }
}

// ============================================================================
// MultiClusterServiceDNSRecord
// ============================================================================

/// Strategy for the `MultiClusterServiceDNSRecord` resource.
#[derive(Clone, Copy, Debug, Default)]
pub struct DnsRecordStrategy;

/// Strategy for the `MultiClusterServiceDNSRecord` status subresource.
#[derive(Clone, Copy, Debug, Default)]
pub struct DnsRecordStatusStrategy;

/// Validate a `MultiClusterServiceDNSRecord` as a new object.
///
/// The object name is a service name, so it must be a DNS-1123 label.
#[must_use]
pub fn validate_dns_record(record: &MultiClusterServiceDNSRecord) -> FieldErrors {
    let mut errs = validate_object_meta(
        &record.metadata,
        true,
        validate_dns1123_label,
        &FieldPath::new("metadata"),
    );
    errs.extend(validate_dns_record_spec(&record.spec, &FieldPath::new("spec")));
    errs
}

/// Validate a `MultiClusterServiceDNSRecord` spec.
#[must_use]
pub fn validate_dns_record_spec(spec: &MultiClusterServiceDNSRecordSpec, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();
    if spec.federation_name.is_empty() {
        errs.required(&path.child("federationName"), "");
    }
    if let Some(suffix) = spec.dns_suffix.as_deref() {
        let trimmed = suffix.trim_end_matches('.');
        for msg in validate_dns1123_subdomain(trimmed) {
            errs.invalid(&path.child("dnsSuffix"), suffix, msg);
        }
    }
    if let Some(ttl) = spec.record_ttl {
        if ttl < 0 {
            errs.invalid(
                &path.child("recordTTL"),
                ttl.to_string(),
                "must be greater than or equal to 0",
            );
        }
    }
    errs
}

/// Validate a `MultiClusterServiceDNSRecord` status block.
#[must_use]
pub fn validate_dns_record_status(
    status: Option<&MultiClusterServiceDNSRecordStatus>,
    path: &FieldPath,
) -> FieldErrors {
    let mut errs = FieldErrors::default();
    let dns_path = path.child("dns");
    let mut seen = HashSet::new();
    for (i, entry) in status.and_then(|s| s.dns.as_ref()).into_iter().flatten().enumerate() {
        let item = dns_path.index(i);
        if entry.cluster.is_empty() {
            errs.required(&item.child("cluster"), "");
        } else if !seen.insert(entry.cluster.as_str()) {
            errs.duplicate(&item.child("cluster"), entry.cluster.as_str());
        }
    }
    errs
}

impl RestStrategy<MultiClusterServiceDNSRecord> for DnsRecordStrategy {
    fn prepare_for_create(&self, obj: &mut MultiClusterServiceDNSRecord) {
        prepare_create(obj);
    }

    fn prepare_for_update(&self, new: &mut MultiClusterServiceDNSRecord, old: &MultiClusterServiceDNSRecord) {
        prepare_spec_update(new, old);
    }

    fn validate(&self, obj: &MultiClusterServiceDNSRecord) -> FieldErrors {
        validate_dns_record(obj)
    }

    fn validate_update(
        &self,
        new: &MultiClusterServiceDNSRecord,
        old: &MultiClusterServiceDNSRecord,
    ) -> FieldErrors {
        let mut errs = validate_object_meta_update(
            &new.metadata,
            &old.metadata,
            &FieldPath::new("metadata"),
        );
        errs.extend(validate_dns_record(new));
        errs
    }
}

impl RestStrategy<MultiClusterServiceDNSRecord> for DnsRecordStatusStrategy {
    fn prepare_for_create(&self, obj: &mut MultiClusterServiceDNSRecord) {
        prepare_create(obj);
    }

    fn prepare_for_update(&self, new: &mut MultiClusterServiceDNSRecord, old: &MultiClusterServiceDNSRecord) {
        prepare_status_update(new, old);
    }

    fn validate(&self, obj: &MultiClusterServiceDNSRecord) -> FieldErrors {
        validate_dns_record(obj)
    }

    fn validate_update(
        &self,
        new: &MultiClusterServiceDNSRecord,
        old: &MultiClusterServiceDNSRecord,
    ) -> FieldErrors {
        let mut errs = validate_object_meta_update(
            &new.metadata,
            &old.metadata,
            &FieldPath::new("metadata"),
        );
        errs.extend(validate_dns_record_status(
            new.status.as_ref(),
            &FieldPath::new("status"),
        ));
        errs
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod strategy_tests;
