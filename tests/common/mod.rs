// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use cluster_registry::crd::{
    Cluster, ClusterSpec, KubernetesApiEndpoints, MultiClusterServiceDNSRecord,
    MultiClusterServiceDNSRecordSpec, ServerAddressByClientCidr,
};
use kube::client::Client;
use std::collections::BTreeMap;

/// Get a Kubernetes client or skip the test if no cluster is reachable
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: no reachable Kubernetes cluster: {e}");
            None
        }
    }
}

/// A cluster reachable at `address` from any client network.
pub fn cluster(name: &str, address: &str) -> Cluster {
    Cluster::new(
        name,
        ClusterSpec {
            kubernetes_api_endpoints: Some(KubernetesApiEndpoints {
                server_endpoints: Some(vec![ServerAddressByClientCidr {
                    client_cidr: "0.0.0.0/0".to_string(),
                    server_address: address.to_string(),
                }]),
                ca_bundle: None,
            }),
            ..Default::default()
        },
    )
}

/// A cluster carrying the given labels.
pub fn labeled_cluster(name: &str, labels: &[(&str, &str)]) -> Cluster {
    let mut c = cluster(name, "10.0.0.1:6443");
    c.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    );
    c
}

/// A DNS record for service `name` in `namespace`.
pub fn dns_record(namespace: &str, name: &str) -> MultiClusterServiceDNSRecord {
    let mut record = MultiClusterServiceDNSRecord::new(
        name,
        MultiClusterServiceDNSRecordSpec {
            federation_name: "galactic".to_string(),
            dns_suffix: Some("example.com".to_string()),
            record_ttl: Some(300),
        },
    );
    record.metadata.namespace = Some(namespace.to_string());
    record
}
