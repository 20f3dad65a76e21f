// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `validation.rs`

#[cfg(test)]
mod tests {
    use crate::validation::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::jiff::Timestamp;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_field_path_rendering() {
        let path = FieldPath::new("spec")
            .child("kubernetesApiEndpoints")
            .child("serverEndpoints")
            .index(2)
            .child("clientCIDR");
        assert_eq!(path.as_str(), "spec.kubernetesApiEndpoints.serverEndpoints[2].clientCIDR");
        assert_eq!(FieldPath::root().child("metadata").as_str(), "metadata");
        assert_eq!(FieldPath::new("metadata").child("labels").key("env").to_string(), "metadata.labels[env]");
    }

    #[test]
    fn test_field_error_display() {
        let mut errs = FieldErrors::default();
        errs.invalid(&FieldPath::new("metadata").child("name"), "Bad", "must be lowercase");
        assert_eq!(errs.to_string(), "metadata.name: Invalid value: \"Bad\": must be lowercase");

        errs.required(&FieldPath::new("spec").child("federationName"), "");
        assert_eq!(
            errs.to_string(),
            "[metadata.name: Invalid value: \"Bad\": must be lowercase, spec.federationName: Required value]"
        );
        assert_eq!(errs.len(), 2);
        assert!(errs.has_field("spec.federationName"));
    }

    #[test]
    fn test_not_supported_lists_values() {
        let mut errs = FieldErrors::default();
        errs.not_supported(&FieldPath::new("status"), "Maybe", &["True", "False"]);
        let err = errs.iter().next().unwrap();
        assert_eq!(err.error_type, FieldErrorType::NotSupported);
        assert_eq!(err.detail, "supported values: \"True\", \"False\"");
    }

    #[test]
    fn test_dns1123_label() {
        assert!(validate_dns1123_label("cluster-s").is_empty());
        assert!(validate_dns1123_label("a1").is_empty());
        assert!(!validate_dns1123_label("").is_empty());
        assert!(!validate_dns1123_label("Upper").is_empty());
        assert!(!validate_dns1123_label("-lead").is_empty());
        assert!(!validate_dns1123_label("trail-").is_empty());
        assert!(!validate_dns1123_label("has.dot").is_empty());
        assert!(!validate_dns1123_label(&"a".repeat(64)).is_empty());
        assert!(validate_dns1123_label(&"a".repeat(63)).is_empty());
    }

    #[test]
    fn test_dns1123_subdomain() {
        assert!(validate_dns1123_subdomain("example.com").is_empty());
        assert!(validate_dns1123_subdomain("cluster-s").is_empty());
        assert!(!validate_dns1123_subdomain("example..com").is_empty());
        assert!(!validate_dns1123_subdomain(".example.com").is_empty());
        assert!(!validate_dns1123_subdomain("Example.com").is_empty());
        assert!(!validate_dns1123_subdomain(&"a".repeat(254)).is_empty());
    }

    #[test]
    fn test_qualified_name() {
        assert!(validate_qualified_name("env").is_empty());
        assert!(validate_qualified_name("Env_Name.v2").is_empty());
        assert!(validate_qualified_name("clusterregistry.k8s.io/role").is_empty());
        assert!(!validate_qualified_name("/role").is_empty());
        assert!(!validate_qualified_name("a/b/c").is_empty());
        assert!(!validate_qualified_name("Bad_Prefix/role").is_empty());
        assert!(!validate_qualified_name("_lead").is_empty());
    }

    #[test]
    fn test_label_value() {
        assert!(validate_label_value("").is_empty());
        assert!(validate_label_value("prod-1.a_b").is_empty());
        assert!(!validate_label_value("has space").is_empty());
        assert!(!validate_label_value("-lead").is_empty());
        assert!(!validate_label_value(&"v".repeat(64)).is_empty());
    }

    #[test]
    fn test_cidr() {
        assert!(validate_cidr("0.0.0.0/0").is_empty());
        assert!(validate_cidr("10.0.0.0/8").is_empty());
        assert!(validate_cidr("fd00::/64").is_empty());
        assert!(!validate_cidr("10.0.0.0").is_empty());
        assert!(!validate_cidr("10.0.0.0/33").is_empty());
        assert!(!validate_cidr("fd00::/129").is_empty());
        assert!(!validate_cidr("not-an-ip/8").is_empty());
    }

    #[test]
    fn test_object_meta_requires_name_or_generate_name() {
        let path = FieldPath::new("metadata");
        let errs = validate_object_meta(&ObjectMeta::default(), false, validate_dns1123_label, &path);
        assert!(errs.has_field("metadata.name"));

        let generated = ObjectMeta {
            generate_name: Some("cluster-".to_string()),
            ..Default::default()
        };
        assert!(validate_object_meta(&generated, false, validate_dns1123_label, &path).is_empty());
    }

    #[test]
    fn test_object_meta_namespace_scope() {
        let path = FieldPath::new("metadata");
        let mut m = meta("nginx");
        let errs = validate_object_meta(&m, true, validate_dns1123_label, &path);
        assert!(errs.has_field("metadata.namespace"));

        m.namespace = Some("web".to_string());
        assert!(validate_object_meta(&m, true, validate_dns1123_label, &path).is_empty());

        let errs = validate_object_meta(&m, false, validate_dns1123_label, &path);
        assert_eq!(
            errs.iter().next().map(|e| e.error_type),
            Some(FieldErrorType::Forbidden)
        );
    }

    #[test]
    fn test_object_meta_reports_every_error() {
        let m = ObjectMeta {
            name: Some("Bad_Name".to_string()),
            labels: Some(map(&[("-key", "ok"), ("env", "bad value")])),
            annotations: Some(map(&[("/nope", "x")])),
            finalizers: Some(vec!["orphan".to_string(), "foregroundDeletion".to_string()]),
            generation: Some(-1),
            ..Default::default()
        };
        let errs = validate_object_meta(&m, false, validate_dns1123_subdomain, &FieldPath::new("metadata"));

        assert!(errs.has_field("metadata.name"));
        assert!(errs.has_field("metadata.labels"));
        assert!(errs.has_field("metadata.labels[env]"));
        assert!(errs.has_field("metadata.annotations"));
        assert!(errs.has_field("metadata.finalizers"));
        assert!(errs.has_field("metadata.generation"));
        assert!(errs.len() >= 6);
    }

    #[test]
    fn test_annotation_size_limit() {
        let big = "x".repeat(300 * 1024);
        let errs = validate_annotations(&map(&[("note", &big)]), &FieldPath::new("metadata").child("annotations"));
        assert_eq!(
            errs.iter().next().map(|e| e.error_type),
            Some(FieldErrorType::TooLong)
        );
    }

    #[test]
    fn test_generate_name_prefix_checked() {
        let m = ObjectMeta {
            generate_name: Some("Bad_".to_string()),
            ..Default::default()
        };
        let errs = validate_object_meta(&m, false, validate_dns1123_label, &FieldPath::new("metadata"));
        assert!(errs.has_field("metadata.generateName"));
    }

    #[test]
    fn test_meta_update_immutability() {
        let created = Time("2025-01-01T00:00:00Z".parse::<Timestamp>().unwrap());
        let old = ObjectMeta {
            name: Some("cluster-s".to_string()),
            uid: Some("uid-1".to_string()),
            creation_timestamp: Some(created.clone()),
            deletion_timestamp: Some(created.clone()),
            ..Default::default()
        };

        let same = old.clone();
        assert!(validate_object_meta_update(&same, &old, &FieldPath::new("metadata")).is_empty());

        let changed = ObjectMeta {
            name: Some("cluster-t".to_string()),
            uid: Some("uid-2".to_string()),
            creation_timestamp: None,
            deletion_timestamp: None,
            ..old.clone()
        };
        let errs = validate_object_meta_update(&changed, &old, &FieldPath::new("metadata"));
        assert!(errs.has_field("metadata.name"));
        assert!(errs.has_field("metadata.uid"));
        assert!(errs.has_field("metadata.creationTimestamp"));
        assert!(errs.has_field("metadata.deletionTimestamp"));
        assert_eq!(errs.len(), 4);
    }
}
