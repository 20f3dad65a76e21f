// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests against a real API server with the CRDs installed.
//!
//! Run with: cargo test --test live_integration -- --ignored

mod common;

use cluster_registry::client::{ClientConfig, Clientset, RegistryInterface};
use cluster_registry::options::{CreateOptions, DeleteOptions, ListOptions, UpdateOptions};
use common::{get_kube_client_or_skip, labeled_cluster};
use kube::ResourceExt;

#[tokio::test]
#[ignore = "requires a Kubernetes cluster with the registry CRDs installed"]
async fn test_cluster_crud_against_api_server() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let clusters = Clientset::new(client, ClientConfig::default()).clusters();
    let name = "registry-live-test";

    // leftovers from an aborted run
    let _ = clusters.delete(name, &DeleteOptions::default()).await;

    let created = clusters
        .create(
            &labeled_cluster(name, &[("test", "integration")]),
            &CreateOptions::default(),
        )
        .await
        .expect("create cluster");
    assert_eq!(created.name_any(), name);

    let listed = clusters
        .list(&ListOptions::default().labels("test=integration"))
        .await
        .expect("list clusters");
    assert!(listed.iter().any(|c| c.name_any() == name));

    let mut stale = created.clone();
    let mut relabeled = created;
    relabeled
        .labels_mut()
        .insert("env".to_string(), "prod".to_string());
    clusters
        .update(&relabeled, &UpdateOptions::default())
        .await
        .expect("update cluster");

    stale.labels_mut().insert("env".to_string(), "dev".to_string());
    let err = clusters
        .update(&stale, &UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{err}");

    clusters
        .delete(name, &DeleteOptions::default())
        .await
        .expect("delete cluster");
}
