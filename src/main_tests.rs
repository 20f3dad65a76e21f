// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - argument parsing and output rendering

#[cfg(test)]
mod tests {
    use super::super::{
        render, Cascade, Cli, Commands, OutputFormat, PatchKind, ResourceAction,
    };
    use clap::Parser;
    use cluster_registry::crd::{Cluster, ClusterSpec};
    use cluster_registry::options::{PatchType, PropagationPolicy};

    #[test]
    fn test_parse_list_with_selector() {
        let cli = Cli::try_parse_from(["cluster-registry", "clusters", "list", "-l", "env=prod"])
            .unwrap();
        assert_eq!(cli.output, OutputFormat::Yaml);
        match cli.command {
            Commands::Clusters {
                action: ResourceAction::List(selectors),
            } => {
                let opts = selectors.list_options();
                assert_eq!(opts.label_selector.as_deref(), Some("env=prod"));
                assert!(opts.field_selector.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cluster-registry",
            "dns-records",
            "get",
            "nginx",
            "-n",
            "web",
            "-o",
            "json",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.namespace.as_deref(), Some("web"));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.dry_run);
        assert!(matches!(
            cli.command,
            Commands::DnsRecords {
                action: ResourceAction::Get { ref name }
            } if name == "nginx"
        ));
    }

    #[test]
    fn test_parse_delete_cascade() {
        let cli = Cli::try_parse_from([
            "cluster-registry",
            "clusters",
            "delete",
            "cluster-s",
            "--cascade",
            "foreground",
        ])
        .unwrap();
        match cli.command {
            Commands::Clusters {
                action: ResourceAction::Delete { name, cascade },
            } => {
                assert_eq!(name, "cluster-s");
                assert_eq!(cascade, Some(Cascade::Foreground));
                assert_eq!(
                    cascade.map(PropagationPolicy::from),
                    Some(PropagationPolicy::Foreground)
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_patch_defaults_to_merge() {
        let cli = Cli::try_parse_from([
            "cluster-registry",
            "clusters",
            "patch",
            "cluster-s",
            "-p",
            "{\"metadata\":{\"labels\":{\"env\":\"prod\"}}}",
        ])
        .unwrap();
        match cli.command {
            Commands::Clusters {
                action:
                    ResourceAction::Patch {
                        patch_type, status, ..
                    },
            } => {
                assert_eq!(patch_type, PatchKind::Merge);
                assert_eq!(PatchType::from(patch_type), PatchType::Merge);
                assert!(!status);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_output() {
        let result =
            Cli::try_parse_from(["cluster-registry", "clusters", "list", "-o", "table"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_formats() {
        let cluster = Cluster::new("cluster-s", ClusterSpec::default());

        assert_eq!(render(&cluster, OutputFormat::Name).unwrap(), "cluster-s");

        let yaml = render(&cluster, OutputFormat::Yaml).unwrap();
        assert!(yaml.starts_with("---\n"));
        assert!(yaml.contains("kind: Cluster"));

        let json: serde_json::Value =
            serde_json::from_str(&render(&cluster, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["metadata"]["name"], "cluster-s");
    }
}
