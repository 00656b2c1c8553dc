//! apm-injector - APM agent injection for Kubernetes pods

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::ObjectMeta;
use kube::core::admission::AdmissionReview;
use kube::{Client, CustomResourceExt};
use tracing::info;

use apm_injector::apm::{Injector, InjectorRegistry, NewrelicConfigInjector};
use apm_injector::config::OperatorConfig;
use apm_injector::crd::Instrumentation;
use apm_injector::telemetry::{init_telemetry, TelemetryConfig};
use apm_injector::webhook::{build_patch, review_pod, KubeInstrumentationSource, WebhookState};

/// apm-injector - inject APM agents into pods from Instrumentation resources
#[derive(Parser, Debug)]
#[command(name = "apm-injector", version, about, long_about = None)]
struct Cli {
    /// Generate the Instrumentation CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Instrument a pod manifest offline and print the result
    ///
    /// Applies the same injection the admission webhook would, without
    /// contacting a cluster. Conflicts and validation errors are reported
    /// as failures.
    Inject(InjectArgs),

    /// Answer an AdmissionReview against the live cluster
    ///
    /// Reads a pod AdmissionReview (JSON), looks up the namespace and its
    /// Instrumentations with the ambient kubeconfig, and prints the review
    /// response the webhook would return.
    Review(ReviewArgs),

    /// List the languages injectors are registered for
    Languages,
}

#[derive(Parser, Debug)]
struct InjectArgs {
    /// Path to the Instrumentation YAML
    #[arg(short = 'i', long = "instrumentation")]
    instrumentation: PathBuf,

    /// Path to the Pod YAML
    #[arg(short = 'p', long = "pod")]
    pod: PathBuf,

    /// Namespace the pod is created in (defaults to the pod's own)
    #[arg(short = 'n', long)]
    namespace: Option<String>,

    /// Print the JSON patch instead of the mutated pod
    #[arg(long)]
    patch: bool,
}

#[derive(Parser, Debug)]
struct ReviewArgs {
    /// Path to the AdmissionReview JSON ("-" for stdin)
    #[arg(short = 'f', long = "file", default_value = "-")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.config.log_format,
        ..Default::default()
    })?;

    if cli.crd {
        let crd = serde_yaml::to_string(&Instrumentation::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let registry = InjectorRegistry::with_default_injectors(Arc::new(
        NewrelicConfigInjector::new(cli.config.cluster_name.clone()),
    ))?;

    match cli.command {
        Some(Commands::Inject(args)) => run_inject(&registry, args).await,
        Some(Commands::Review(args)) => run_review(registry, args).await,
        Some(Commands::Languages) => {
            for language in registry.languages() {
                println!("{language}");
            }
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

async fn run_inject(registry: &InjectorRegistry, args: InjectArgs) -> anyhow::Result<()> {
    let inst: Instrumentation = read_yaml(&args.instrumentation)?;
    let original: Pod = read_yaml(&args.pod)?;

    let ns_name = args
        .namespace
        .or_else(|| original.metadata.namespace.clone())
        .or_else(|| inst.metadata.namespace.clone())
        .unwrap_or_else(|| "default".to_string());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(ns_name.clone()),
            ..Default::default()
        },
        ..Default::default()
    };

    let injector = registry.lookup(inst.spec.agent.language)?;
    let mut pod = original.clone();
    injector.inject(&inst, &namespace, &mut pod).await?;

    info!(
        instrumentation = %inst.name(),
        namespace = %ns_name,
        language = %inst.spec.agent.language,
        "Injected instrumentation"
    );

    if args.patch {
        let patch = build_patch(&original, &pod)?;
        println!("{}", serde_json::to_string_pretty(&patch)?);
    } else {
        print!("{}", serde_yaml::to_string(&pod)?);
    }
    Ok(())
}

async fn run_review(registry: InjectorRegistry, args: ReviewArgs) -> anyhow::Result<()> {
    let raw = if args.file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
    } else {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("failed to read {}", args.file.display()))?
    };
    let review: AdmissionReview<Pod> =
        serde_json::from_str(&raw).context("failed to parse AdmissionReview")?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let state = WebhookState::new(
        Arc::new(registry),
        Arc::new(KubeInstrumentationSource::new(client)),
    );

    let answer = review_pod(&state, review).await;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}
