// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{
        API_VERSION, CLUSTER_REGISTRY_GROUP, KIND_CLUSTER, KIND_MULTI_CLUSTER_SERVICE_DNS_RECORD,
        MULTICLUSTER_DNS_GROUP, PLURAL_CLUSTERS, PLURAL_MULTI_CLUSTER_SERVICE_DNS_RECORDS,
    };
    use crate::crd::*;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus};
    use kube::{CustomResourceExt, Resource};
    use serde_json::json;

    #[test]
    fn test_cluster_identity() {
        assert_eq!(Cluster::kind(&()), "Cluster");
        assert_eq!(Cluster::group(&()), "clusterregistry.k8s.io");
        assert_eq!(Cluster::version(&()), "v1alpha1");
        assert_eq!(Cluster::plural(&()), "clusters");
        assert_eq!(Cluster::qualified_resource(), "clusters.clusterregistry.k8s.io");
        assert!(!Cluster::NAMESPACED);
    }

    #[test]
    fn test_dns_record_identity() {
        assert_eq!(
            MultiClusterServiceDNSRecord::kind(&()),
            "MultiClusterServiceDNSRecord"
        );
        assert_eq!(
            MultiClusterServiceDNSRecord::qualified_resource(),
            "multiclusterservicednsrecords.multiclusterdns.federation.k8s.io"
        );
        assert!(MultiClusterServiceDNSRecord::NAMESPACED);
    }

    #[test]
    fn test_identity_matches_constants() {
        assert_eq!(Cluster::group(&()), CLUSTER_REGISTRY_GROUP);
        assert_eq!(Cluster::version(&()), API_VERSION);
        assert_eq!(Cluster::kind(&()), KIND_CLUSTER);
        assert_eq!(Cluster::plural(&()), PLURAL_CLUSTERS);

        assert_eq!(MultiClusterServiceDNSRecord::group(&()), MULTICLUSTER_DNS_GROUP);
        assert_eq!(MultiClusterServiceDNSRecord::version(&()), API_VERSION);
        assert_eq!(
            MultiClusterServiceDNSRecord::kind(&()),
            KIND_MULTI_CLUSTER_SERVICE_DNS_RECORD
        );
        assert_eq!(
            MultiClusterServiceDNSRecord::plural(&()),
            PLURAL_MULTI_CLUSTER_SERVICE_DNS_RECORDS
        );
    }

    #[test]
    fn test_cluster_crd_scope_and_status_subresource() {
        let crd = Cluster::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.names.plural, "clusters");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }

    #[test]
    fn test_dns_record_crd_is_namespaced() {
        let crd = MultiClusterServiceDNSRecord::crd();
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.group, "multiclusterdns.federation.k8s.io");
    }

    #[test]
    fn test_dns_record_schema_constraints() {
        let crd = serde_json::to_value(MultiClusterServiceDNSRecord::crd()).unwrap();
        let spec = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]
            ["properties"];
        assert_eq!(spec["recordTTL"]["minimum"].as_f64(), Some(0.0));
        assert_eq!(spec["federationName"]["minLength"].as_i64(), Some(1));
        assert!(spec["dnsSuffix"]["pattern"].is_string());

        let crd = serde_json::to_value(Cluster::crd()).unwrap();
        let endpoint = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]
            ["properties"]["kubernetesApiEndpoints"]["properties"]["serverEndpoints"]["items"]
            ["properties"];
        assert_eq!(endpoint["serverAddress"]["minLength"].as_i64(), Some(1));
    }

    #[test]
    fn test_cluster_wire_names() {
        let cluster = Cluster::new(
            "cluster-s",
            ClusterSpec {
                kubernetes_api_endpoints: Some(KubernetesApiEndpoints {
                    server_endpoints: Some(vec![ServerAddressByClientCidr {
                        client_cidr: "10.0.0.0/8".to_string(),
                        server_address: "10.0.0.1:6443".to_string(),
                    }]),
                    ca_bundle: Some("Y2E=".to_string()),
                }),
                auth_info: Some(AuthInfo {
                    user: None,
                    controller: Some(AuthProviderReference {
                        kind: Some("Secret".to_string()),
                        name: "creds".to_string(),
                        namespace: Some("registry-system".to_string()),
                    }),
                }),
                cloud_provider: Some(CloudProvider {
                    name: "gce".to_string(),
                }),
            },
        );

        let value = serde_json::to_value(&cluster).unwrap();
        assert_eq!(value["apiVersion"], "clusterregistry.k8s.io/v1alpha1");
        let endpoint = &value["spec"]["kubernetesApiEndpoints"]["serverEndpoints"][0];
        assert_eq!(endpoint["clientCIDR"], "10.0.0.0/8");
        assert_eq!(endpoint["serverAddress"], "10.0.0.1:6443");
        assert_eq!(value["spec"]["kubernetesApiEndpoints"]["caBundle"], "Y2E=");
        assert_eq!(value["spec"]["authInfo"]["controller"]["name"], "creds");
        assert!(value["spec"]["authInfo"].get("user").is_none());
        assert_eq!(value["spec"]["cloudProvider"]["name"], "gce");
    }

    #[test]
    fn test_dns_record_deserializes_record_ttl() {
        let record: MultiClusterServiceDNSRecord = serde_json::from_value(json!({
            "apiVersion": "multiclusterdns.federation.k8s.io/v1alpha1",
            "kind": "MultiClusterServiceDNSRecord",
            "metadata": {"name": "nginx", "namespace": "web"},
            "spec": {"federationName": "galactic", "dnsSuffix": "example.com", "recordTTL": 300},
            "status": {"dns": [{
                "cluster": "c1",
                "region": "us-east1",
                "loadBalancer": {"ingress": [{"ip": "1.2.3.4"}]}
            }]}
        }))
        .unwrap();

        assert_eq!(record.spec.federation_name, "galactic");
        assert_eq!(record.spec.record_ttl, Some(300));
        let dns = record.status.and_then(|s| s.dns).unwrap();
        assert_eq!(dns[0].cluster, "c1");
        assert_eq!(
            dns[0]
                .load_balancer
                .as_ref()
                .and_then(|lb| lb.ingress.as_ref())
                .map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn test_cluster_condition_type_field() {
        let condition = ClusterCondition {
            r#type: "Ok".to_string(),
            status: "True".to_string(),
            reason: Some("Probed".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["type"], "Ok");
        assert!(value.get("lastHeartbeatTime").is_none());
    }

    #[test]
    fn test_status_and_spec_copy_hooks() {
        let mut target = Cluster::new("cluster-s", ClusterSpec::default());
        let mut source = Cluster::new(
            "cluster-s",
            ClusterSpec {
                cloud_provider: Some(CloudProvider {
                    name: "aws".to_string(),
                }),
                ..Default::default()
            },
        );
        source.status = Some(ClusterStatus {
            region: Some("us-east-1".to_string()),
            ..Default::default()
        });

        assert!(!target.spec_eq(&source));
        target.copy_spec_from(&source);
        assert!(target.spec_eq(&source));
        assert!(target.status.is_none());

        target.copy_status_from(&source);
        assert_eq!(target, source);

        target.clear_status();
        assert!(target.status.is_none());
    }

    #[test]
    fn test_empty_objects_have_no_name() {
        assert!(Cluster::empty().metadata.name.as_deref().unwrap_or_default().is_empty());
        let record = MultiClusterServiceDNSRecord::empty();
        assert!(record.spec.federation_name.is_empty());
        assert!(record.status.is_none());
    }

    #[test]
    fn test_merge_keys() {
        assert!(Cluster::MERGE_KEYS.contains(&("serverEndpoints", "clientCIDR")));
        assert!(Cluster::MERGE_KEYS.contains(&("conditions", "type")));
        assert_eq!(MultiClusterServiceDNSRecord::MERGE_KEYS, &[("dns", "cluster")]);
    }

    #[test]
    fn test_load_balancer_round_trips_through_status() {
        let mut record = MultiClusterServiceDNSRecord::new(
            "nginx",
            MultiClusterServiceDNSRecordSpec {
                federation_name: "galactic".to_string(),
                ..Default::default()
            },
        );
        record.status = Some(MultiClusterServiceDNSRecordStatus {
            dns: Some(vec![ClusterDns {
                cluster: "c1".to_string(),
                zones: Some(vec!["us-east1-b".to_string()]),
                region: None,
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        hostname: Some("lb.example.com".to_string()),
                        ..Default::default()
                    }]),
                }),
            }]),
        });

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value["status"]["dns"][0]["loadBalancer"]["ingress"][0]["hostname"],
            "lb.example.com"
        );
    }
}
