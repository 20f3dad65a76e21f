// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cluster_registry::{
    client::{list_all, ClientConfig, Clientset, RegistryInterface, ResourceClient},
    constants::{ENV_FIELD_MANAGER, ENV_NAMESPACE},
    crd::RegistryKind,
    options::{
        CreateOptions, DeleteOptions, DeleteOutcome, ListOptions, PatchOptions, PatchType,
        PropagationPolicy, WatchEvent, WatchOptions,
    },
};
use futures::StreamExt;
use kube::ResourceExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// cluster-registry - inspect and edit Cluster and MultiClusterServiceDNSRecord objects
#[derive(Parser, Debug)]
#[command(name = "cluster-registry", version, about, long_about = None)]
struct Cli {
    /// Namespace for MultiClusterServiceDNSRecord commands
    #[arg(short = 'n', long, global = true, env = ENV_NAMESPACE)]
    namespace: Option<String>,

    /// Field manager recorded on writes
    #[arg(long, global = true, env = ENV_FIELD_MANAGER)]
    field_manager: Option<String>,

    /// Send writes as dry runs; nothing is persisted
    #[arg(long, global = true)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cluster objects (cluster-scoped)
    #[command(alias = "cluster")]
    Clusters {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// MultiClusterServiceDNSRecord objects (namespaced)
    #[command(name = "dns-records", alias = "mcsdr")]
    DnsRecords {
        #[command(subcommand)]
        action: ResourceAction,
    },
}

#[derive(Subcommand, Debug)]
enum ResourceAction {
    /// List objects, following continue tokens
    List(SelectorArgs),

    /// Print one object
    Get {
        name: String,
    },

    /// Create an object from a YAML or JSON file
    Create {
        #[arg(short = 'f', long = "filename")]
        file: PathBuf,
    },

    /// Apply a patch document to an object
    Patch {
        name: String,

        /// Patch document, JSON or YAML
        #[arg(short = 'p', long)]
        patch: String,

        #[arg(long = "type", value_enum, default_value_t = PatchKind::Merge)]
        patch_type: PatchKind,

        /// Patch the status subresource instead of the object
        #[arg(long)]
        status: bool,
    },

    /// Delete an object
    Delete {
        name: String,

        /// Dependent handling
        #[arg(long, value_enum)]
        cascade: Option<Cascade>,
    },

    /// Delete every object matching a selector
    DeleteAll(SelectorArgs),

    /// Stream changes until interrupted
    Watch {
        #[command(flatten)]
        selectors: SelectorArgs,

        /// Resume after this resource version
        #[arg(long)]
        resource_version: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
struct SelectorArgs {
    /// Label selector, e.g. `env=prod,tier!=edge`
    #[arg(short = 'l', long)]
    selector: Option<String>,

    /// Field selector, e.g. `metadata.name=cluster-s`
    #[arg(long)]
    field_selector: Option<String>,
}

impl SelectorArgs {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            label_selector: self.selector.clone(),
            field_selector: self.field_selector.clone(),
            ..ListOptions::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
    Name,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PatchKind {
    Json,
    Merge,
    Strategic,
}

impl From<PatchKind> for PatchType {
    fn from(kind: PatchKind) -> Self {
        match kind {
            PatchKind::Json => PatchType::Json,
            PatchKind::Merge => PatchType::Merge,
            PatchKind::Strategic => PatchType::Strategic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Cascade {
    Orphan,
    Background,
    Foreground,
}

impl From<Cascade> for PropagationPolicy {
    fn from(cascade: Cascade) -> Self {
        match cascade {
            Cascade::Orphan => PropagationPolicy::Orphan,
            Cascade::Background => PropagationPolicy::Background,
            Cascade::Foreground => PropagationPolicy::Foreground,
        }
    }
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("cluster-registry")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG (default info) and RUST_LOG_FORMAT=json|text.
    // Logs go to stderr so command output on stdout stays parseable.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    let cli = Cli::parse();
    debug!(?cli, "Parsed command line");

    let config = client_config(&cli);
    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    let clientset = Clientset::new(client, config);

    match cli.command {
        Commands::Clusters { action } => {
            run(clientset.clusters().as_ref(), action, cli.output, clientset.config()).await
        }
        Commands::DnsRecords { action } => {
            let records = clientset.multi_cluster_service_dns_records(&clientset.config().namespace);
            run(records.as_ref(), action, cli.output, clientset.config()).await
        }
    }
}

/// Environment defaults overridden by command-line flags.
fn client_config(cli: &Cli) -> ClientConfig {
    let mut config = ClientConfig::from_env().with_dry_run(cli.dry_run);
    if let Some(namespace) = cli.namespace.as_deref() {
        config = config.with_namespace(namespace);
    }
    if let Some(manager) = cli.field_manager.as_deref() {
        config.field_manager = manager.to_string();
    }
    config
}

async fn run<K: RegistryKind>(
    client: &dyn ResourceClient<K>,
    action: ResourceAction,
    output: OutputFormat,
    config: &ClientConfig,
) -> Result<()> {
    match action {
        ResourceAction::List(selectors) => {
            let items = list_all(client, &selectors.list_options(), config.page_size).await?;
            debug!(count = items.len(), "Listed objects");
            for item in &items {
                print_object(item, output)?;
            }
        }
        ResourceAction::Get { name } => {
            print_object(&client.get(&name).await?, output)?;
        }
        ResourceAction::Create { file } => {
            let obj: K = read_object(&file)?;
            let created = client.create(&obj, &CreateOptions::default()).await?;
            info!(name = %created.name_any(), "Created object");
            print_object(&created, output)?;
        }
        ResourceAction::Patch {
            name,
            patch,
            patch_type,
            status,
        } => {
            let document: serde_json::Value =
                serde_yaml::from_str(&patch).context("patch is not valid JSON or YAML")?;
            let subresource = status.then_some("status");
            let patched = client
                .patch(
                    &name,
                    patch_type.into(),
                    &document,
                    subresource,
                    &PatchOptions::default(),
                )
                .await?;
            print_object(&patched, output)?;
        }
        ResourceAction::Delete { name, cascade } => {
            let opts = DeleteOptions {
                propagation_policy: cascade.map(Into::into),
                ..DeleteOptions::default()
            };
            match client.delete(&name, &opts).await? {
                DeleteOutcome::Deleted => println!("{name} deleted"),
                DeleteOutcome::Pending(obj) => println!(
                    "{name} marked for deletion, waiting on finalizers {:?}",
                    obj.finalizers()
                ),
            }
        }
        ResourceAction::DeleteAll(selectors) => {
            client
                .delete_collection(&DeleteOptions::default(), &selectors.list_options())
                .await?;
            println!("collection deleted");
        }
        ResourceAction::Watch {
            selectors,
            resource_version,
        } => {
            let opts = WatchOptions {
                label_selector: selectors.selector,
                field_selector: selectors.field_selector,
                resource_version,
                timeout_seconds: None,
            };
            watch(client, &opts, output).await?;
        }
    }
    Ok(())
}

async fn watch<K: RegistryKind>(
    client: &dyn ResourceClient<K>,
    opts: &WatchOptions,
    output: OutputFormat,
) -> Result<()> {
    let mut stream = client.watch(opts).await?;
    info!("Watching, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                return Ok(());
            }
            event = stream.next() => {
                let Some(event) = event else {
                    warn!("Watch closed by server");
                    return Ok(());
                };
                match event? {
                    WatchEvent::Added(obj) => print_event("ADDED", &obj, output)?,
                    WatchEvent::Modified(obj) => print_event("MODIFIED", &obj, output)?,
                    WatchEvent::Deleted(obj) => print_event("DELETED", &obj, output)?,
                    WatchEvent::Bookmark(rv) => debug!(resource_version = %rv, "Bookmark"),
                }
            }
        }
    }
}

fn read_object<K: RegistryKind>(path: &Path) -> Result<K> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn render<K: Serialize + ResourceExt>(obj: &K, output: OutputFormat) -> Result<String> {
    Ok(match output {
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(obj)?),
        OutputFormat::Json => serde_json::to_string_pretty(obj)?,
        OutputFormat::Name => obj.name_any(),
    })
}

fn print_object<K: Serialize + ResourceExt>(obj: &K, output: OutputFormat) -> Result<()> {
    println!("{}", render(obj, output)?);
    Ok(())
}

fn print_event<K: Serialize + ResourceExt>(
    event_type: &str,
    obj: &K,
    output: OutputFormat,
) -> Result<()> {
    match output {
        OutputFormat::Name => println!("{event_type}\t{}", obj.name_any()),
        _ => println!("# {event_type}\n{}", render(obj, output)?),
    }
    Ok(())
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
