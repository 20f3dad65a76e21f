// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the store adapter in `registry/mod.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{
        FINALIZER_DELETE_DEPENDENTS, FINALIZER_ORPHAN_DEPENDENTS, GENERATE_NAME_ALPHABET,
    };
    use crate::crd::{
        AuthInfo, Cluster, ClusterCondition, ClusterSpec, ClusterStatus, KubernetesApiEndpoints,
        MultiClusterServiceDNSRecord, MultiClusterServiceDNSRecordSpec, ServerAddressByClientCidr,
    };
    use crate::errors::RegistryError;
    use crate::options::{
        CreateOptions, DeleteOptions, DeleteOutcome, ListOptions, PatchOptions, PatchType,
        Preconditions, UpdateOptions, WatchEvent, WatchOptions,
    };
    use crate::registry::{generate_name, generate_uid, ResourceStore};
    use futures::StreamExt;
    use kube::ResourceExt;
    use serde_json::json;
    use std::time::Duration;

    fn cluster(name: &str) -> Cluster {
        Cluster::new(
            name,
            ClusterSpec {
                kubernetes_api_endpoints: Some(KubernetesApiEndpoints {
                    server_endpoints: Some(vec![ServerAddressByClientCidr {
                        client_cidr: "0.0.0.0/0".to_string(),
                        server_address: "10.0.0.1:6443".to_string(),
                    }]),
                    ca_bundle: None,
                }),
                auth_info: None,
                cloud_provider: None,
            },
        )
    }

    fn record(namespace: &str, name: &str) -> MultiClusterServiceDNSRecord {
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

    fn create() -> CreateOptions {
        CreateOptions::default()
    }

    fn update() -> UpdateOptions {
        UpdateOptions::default()
    }

    // ========== generated names ==========

    #[test]
    fn test_generate_name_appends_suffix() {
        let name = generate_name("cluster-");
        assert_eq!(name.len(), "cluster-".len() + 5);
        assert!(name.starts_with("cluster-"));
        assert!(name["cluster-".len()..]
            .bytes()
            .all(|b| GENERATE_NAME_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_name_truncates_long_base() {
        let base = "a".repeat(80);
        assert_eq!(generate_name(&base).len(), 63);
    }

    #[test]
    fn test_generate_name_is_unique() {
        assert_ne!(generate_name("x-"), generate_name("x-"));
    }

    #[test]
    fn test_generate_uid_format() {
        let uid = generate_uid();
        let parts: Vec<&str> = uid.split('-').collect();
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
        assert!(parts[2].starts_with('4'));
        assert_ne!(uid, generate_uid());
    }

    // ========== create ==========

    #[tokio::test]
    async fn test_create_then_get_returns_created_object() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();

        assert_eq!(created.metadata.generation, Some(1));
        assert!(created.resource_version().is_some());
        assert!(created.uid().is_some());

        let fetched = store.get(None, "cluster-s").await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.spec, cluster("cluster-s").spec);
    }

    #[tokio::test]
    async fn test_create_clears_status() {
        let store = ResourceStore::in_memory_clusters();
        let mut obj = cluster("cluster-s");
        obj.status = Some(ClusterStatus {
            region: Some("us-east-1".to_string()),
            ..Default::default()
        });

        let created = store.create(obj, &create()).await.unwrap();
        assert!(created.status.is_none());
    }

    #[tokio::test]
    async fn test_create_invalid_does_not_persist() {
        let store = ResourceStore::in_memory_clusters();
        let mut obj = cluster("Bad_Name");
        obj.spec.auth_info = Some(AuthInfo {
            user: Some(Default::default()),
            controller: None,
        });

        let err = store.create(obj, &create()).await.unwrap_err();
        assert!(err.is_invalid());
        let errors = err.field_errors().unwrap();
        assert!(errors.has_field("metadata.name"));
        assert!(errors.has_field("spec.authInfo.user"));

        let list = store.list(None, &ListOptions::default()).await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_create_expands_generate_name() {
        let store = ResourceStore::in_memory_clusters();
        let mut obj = Cluster::new("", ClusterSpec::default());
        obj.metadata.name = None;
        obj.metadata.generate_name = Some("member-".to_string());

        let created = store.create(obj, &create()).await.unwrap();
        assert!(created.name_any().starts_with("member-"));
        assert_eq!(created.name_any().len(), "member-".len() + 5);
    }

    #[tokio::test]
    async fn test_create_dry_run_does_not_persist() {
        let store = ResourceStore::in_memory_clusters();
        let opts = CreateOptions {
            dry_run: true,
            ..Default::default()
        };
        let obj = store.create(cluster("cluster-s"), &opts).await.unwrap();
        assert_eq!(obj.metadata.generation, Some(1));
        assert!(store.get(None, "cluster-s").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_cluster_drops_namespace() {
        let store = ResourceStore::in_memory_clusters();
        let mut obj = cluster("cluster-s");
        obj.metadata.namespace = Some("default".to_string());

        let created = store.create(obj, &create()).await.unwrap();
        assert!(created.namespace().is_none());
    }

    #[tokio::test]
    async fn test_create_dns_record_requires_namespace() {
        let store = ResourceStore::in_memory_dns_records();
        let mut obj = record("web", "nginx");
        obj.metadata.namespace = None;

        let err = store.create(obj, &create()).await.unwrap_err();
        assert!(err.field_errors().unwrap().has_field("metadata.namespace"));
    }

    // ========== the cluster-s scenario ==========

    #[tokio::test]
    async fn test_cluster_lifecycle_scenario() {
        let store = ResourceStore::in_memory_clusters();

        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();
        let fetched = store.get(None, "cluster-s").await.unwrap();
        assert_eq!(fetched.name_any(), "cluster-s");

        let err = store.create(cluster("cluster-s"), &create()).await.unwrap_err();
        assert!(err.is_already_exists());

        let mut labelled = fetched.clone();
        labelled.labels_mut().insert("env".to_string(), "prod".to_string());
        let updated = store.update(labelled, &update()).await.unwrap();
        assert_ne!(updated.resource_version(), created.resource_version());
        assert_eq!(updated.labels().get("env").map(String::as_str), Some("prod"));

        let mut stale = fetched;
        stale.labels_mut().insert("env".to_string(), "dev".to_string());
        let err = store.update(stale, &update()).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get(None, "cluster-s").await.unwrap();
        assert_eq!(stored, updated);
    }

    // ========== update ==========

    #[tokio::test]
    async fn test_update_without_version_is_unconditional() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let mut obj = cluster("cluster-s");
        obj.labels_mut().insert("env".to_string(), "prod".to_string());
        let updated = store.update(obj, &update()).await.unwrap();
        assert_eq!(updated.labels().get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = ResourceStore::in_memory_clusters();
        let err = store.update(cluster("ghost"), &update()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_bumps_generation_only_on_spec_change() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();

        let mut relabelled = created.clone();
        relabelled.labels_mut().insert("env".to_string(), "prod".to_string());
        let relabelled = store.update(relabelled, &update()).await.unwrap();
        assert_eq!(relabelled.metadata.generation, Some(1));

        let mut respec = relabelled;
        respec.spec.cloud_provider = Some(crate::crd::CloudProvider {
            name: "aws".to_string(),
        });
        let respec = store.update(respec, &update()).await.unwrap();
        assert_eq!(respec.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_update_ignores_status_changes() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();

        let mut obj = created.clone();
        obj.status = Some(ClusterStatus {
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        });
        let result = store.update(obj, &update()).await.unwrap();
        assert!(result.status.is_none());
        assert_eq!(result.resource_version(), created.resource_version());
    }

    #[tokio::test]
    async fn test_update_changing_uid_is_invalid() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();

        let mut obj = created.clone();
        obj.metadata.uid = Some("00000000-0000-4000-8000-000000000000".to_string());
        let err = store.update(obj, &update()).await.unwrap_err();
        assert!(err.field_errors().unwrap().has_field("metadata.uid"));

        let stored = store.get(None, "cluster-s").await.unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn test_update_status_keeps_spec_and_labels() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();

        let mut obj = created.clone();
        obj.labels_mut().insert("env".to_string(), "prod".to_string());
        obj.spec.kubernetes_api_endpoints = None;
        obj.status = Some(ClusterStatus {
            conditions: Some(vec![ClusterCondition {
                r#type: "Ok".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            zones: Some(vec!["b".to_string(), "a".to_string(), "b".to_string()]),
            region: Some("us-east-1".to_string()),
        });

        let updated = store.update_status(obj, &update()).await.unwrap();
        assert_eq!(updated.spec, created.spec);
        assert!(updated.labels().is_empty());
        let status = updated.status.unwrap();
        assert_eq!(status.zones, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(updated.metadata.generation, Some(1));
    }

    #[tokio::test]
    async fn test_update_status_validates_conditions() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();

        let mut obj = created;
        obj.status = Some(ClusterStatus {
            conditions: Some(vec![ClusterCondition {
                r#type: "Exploded".to_string(),
                status: "Maybe".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let err = store.update_status(obj, &update()).await.unwrap_err();
        let errors = err.field_errors().unwrap();
        assert!(errors.has_field("status.conditions[0].type"));
        assert!(errors.has_field("status.conditions[0].status"));
    }

    // ========== patch ==========

    #[tokio::test]
    async fn test_merge_patch_adds_label() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let patched = store
            .patch(
                None,
                "cluster-s",
                PatchType::Merge,
                &json!({"metadata": {"labels": {"env": "prod"}}}),
                None,
                &PatchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(patched.labels().get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_patch_changing_name_is_invalid() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let err = store
            .patch(
                None,
                "cluster-s",
                PatchType::Merge,
                &json!({"metadata": {"name": "cluster-t"}}),
                None,
                &PatchOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.field_errors().unwrap().has_field("metadata.name"));
        assert!(store.get(None, "cluster-t").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_patch_with_stale_version_conflicts() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();
        let mut bumped = created.clone();
        bumped.labels_mut().insert("a".to_string(), "b".to_string());
        store.update(bumped, &update()).await.unwrap();

        let err = store
            .patch(
                None,
                "cluster-s",
                PatchType::Merge,
                &json!({"metadata": {"resourceVersion": created.resource_version()}}),
                None,
                &PatchOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_strategic_patch_merges_status_conditions() {
        let store = ResourceStore::in_memory_clusters();
        let created = store.create(cluster("cluster-s"), &create()).await.unwrap();
        let mut obj = created;
        obj.status = Some(ClusterStatus {
            conditions: Some(vec![ClusterCondition {
                r#type: "Ok".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        store.update_status(obj, &update()).await.unwrap();

        let patched = store
            .patch(
                None,
                "cluster-s",
                PatchType::Strategic,
                &json!({"status": {"conditions": [{"type": "Offline", "status": "False"}]}}),
                Some("status"),
                &PatchOptions::default(),
            )
            .await
            .unwrap();
        let conditions = patched.status.unwrap().conditions.unwrap();
        let types: Vec<&str> = conditions.iter().map(|c| c.r#type.as_str()).collect();
        assert_eq!(types, vec!["Ok", "Offline"]);
    }

    #[tokio::test]
    async fn test_patch_unknown_subresource_is_bad_request() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let err = store
            .patch(
                None,
                "cluster-s",
                PatchType::Merge,
                &json!({}),
                Some("scale"),
                &PatchOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn test_json_patch_replace_spec_field() {
        let store = ResourceStore::in_memory_dns_records();
        store.create(record("web", "nginx"), &create()).await.unwrap();

        let patched = store
            .patch(
                Some("web"),
                "nginx",
                PatchType::Json,
                &json!([{"op": "replace", "path": "/spec/recordTTL", "value": 60}]),
                None,
                &PatchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(patched.spec.record_ttl, Some(60));
        assert_eq!(patched.metadata.generation, Some(2));
    }

    // ========== delete ==========

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = ResourceStore::in_memory_clusters();
        let err = store
            .delete(None, "ghost", &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_removes() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let outcome = store
            .delete(None, "cluster-s", &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(store.get(None, "cluster-s").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_with_uid_precondition_mismatch_conflicts() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let opts = DeleteOptions {
            preconditions: Some(Preconditions {
                uid: Some("wrong".to_string()),
                resource_version: None,
            }),
            ..Default::default()
        };
        let err = store.delete(None, "cluster-s", &opts).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.get(None, "cluster-s").await.is_ok());
    }

    #[tokio::test]
    async fn test_foreground_delete_is_pending_until_finalizer_removed() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        let outcome = store
            .delete(None, "cluster-s", &DeleteOptions::foreground())
            .await
            .unwrap();
        let DeleteOutcome::Pending(pending) = outcome else {
            panic!("expected pending deletion");
        };
        assert!(pending.metadata.deletion_timestamp.is_some());
        assert_eq!(pending.finalizers(), [FINALIZER_DELETE_DEPENDENTS.to_string()]);

        let mut cleared = pending;
        cleared.metadata.finalizers = None;
        store.update(cleared, &update()).await.unwrap();
        assert!(store.get(None, "cluster-s").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_orphan_delete_replaces_foreground_finalizer() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();
        store
            .delete(None, "cluster-s", &DeleteOptions::foreground())
            .await
            .unwrap();

        let outcome = store
            .delete(None, "cluster-s", &DeleteOptions::orphan())
            .await
            .unwrap();
        let DeleteOutcome::Pending(pending) = outcome else {
            panic!("expected pending deletion");
        };
        assert_eq!(pending.finalizers(), [FINALIZER_ORPHAN_DEPENDENTS.to_string()]);
    }

    #[tokio::test]
    async fn test_update_cannot_clear_deletion_timestamp() {
        let store = ResourceStore::in_memory_clusters();
        let mut obj = cluster("cluster-s");
        obj.metadata.finalizers = Some(vec!["example.com/cleanup".to_string()]);
        store.create(obj, &create()).await.unwrap();

        let DeleteOutcome::Pending(pending) = store
            .delete(None, "cluster-s", &DeleteOptions::default())
            .await
            .unwrap()
        else {
            panic!("expected pending deletion");
        };

        let mut revived = pending.clone();
        revived.metadata.deletion_timestamp = None;
        revived.labels_mut().insert("x".to_string(), "y".to_string());
        let updated = store.update(revived, &update()).await.unwrap();
        assert_eq!(
            updated.metadata.deletion_timestamp,
            pending.metadata.deletion_timestamp
        );
    }

    #[tokio::test]
    async fn test_delete_collection_with_no_matches_succeeds() {
        let store = ResourceStore::in_memory_clusters();
        store.create(cluster("cluster-s"), &create()).await.unwrap();

        store
            .delete_collection(
                None,
                &ListOptions::default().labels("env=none"),
                &DeleteOptions::default(),
            )
            .await
            .unwrap();
        assert!(store.get(None, "cluster-s").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_collection_removes_matching() {
        let store = ResourceStore::in_memory_dns_records();
        let mut tagged = record("web", "nginx");
        tagged.labels_mut().insert("team".to_string(), "edge".to_string());
        store.create(tagged, &create()).await.unwrap();
        store.create(record("web", "redis"), &create()).await.unwrap();

        store
            .delete_collection(
                Some("web"),
                &ListOptions::default().labels("team=edge"),
                &DeleteOptions::default(),
            )
            .await
            .unwrap();

        let remaining = store.list(Some("web"), &ListOptions::default()).await.unwrap();
        let names: Vec<String> = remaining.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["redis"]);
    }

    #[tokio::test]
    async fn test_delete_collection_aggregates_item_failures() {
        let store = ResourceStore::in_memory_clusters();
        let first = store.create(cluster("a"), &create()).await.unwrap();
        store.create(cluster("b"), &create()).await.unwrap();
        store.create(cluster("c"), &create()).await.unwrap();

        let opts = DeleteOptions {
            preconditions: Some(Preconditions {
                uid: first.metadata.uid.clone(),
                resource_version: None,
            }),
            ..Default::default()
        };
        let err = store
            .delete_collection(None, &ListOptions::default(), &opts)
            .await
            .unwrap_err();
        match &err {
            RegistryError::Aggregate(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(RegistryError::is_conflict));
            }
            other => panic!("expected an aggregate error, got {other}"),
        }
        assert_eq!(err.code(), 500);

        let remaining = store.list(None, &ListOptions::default()).await.unwrap();
        let names: Vec<String> = remaining.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    // ========== list and watch ==========

    #[tokio::test]
    async fn test_list_rejects_bad_selector() {
        let store = ResourceStore::in_memory_clusters();
        let err = store
            .list(None, &ListOptions::default().labels("env in prod"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn test_get_dns_record_without_namespace_is_bad_request() {
        let store = ResourceStore::in_memory_dns_records();
        let err = store.get(None, "nginx").await.unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn test_watch_sees_store_writes() {
        let store = ResourceStore::in_memory_clusters();
        let mut stream = store.watch(None, &WatchOptions::default()).await.unwrap();

        store.create(cluster("cluster-s"), &create()).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(event, WatchEvent::Added(c) if c.name_any() == "cluster-s"));
    }

    #[tokio::test]
    async fn test_watch_timeout_ends_stream() {
        let store = ResourceStore::in_memory_clusters();
        let opts = WatchOptions {
            timeout_seconds: Some(1),
            ..Default::default()
        };
        let mut stream = store.watch(None, &opts).await.unwrap();
        let end = tokio::time::timeout(Duration::from_secs(3), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }
}
