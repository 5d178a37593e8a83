//! Maestro - agent deployment client
//!
//! Usage:
//!   maestro deploy [PATH]     # Create, update or redeploy an agent
//!   maestro status            # Show deployment state for this directory
//!   maestro bundle <DIR>      # Package a directory without deploying
//!   maestro run <AGENT_ID>    # Execute an agent and print the result
//!   maestro setup             # Persist API settings

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use maestro_core::api::{Agent, AgentApi, AgentDefinition, JsonMap};
use maestro_core::bundle::{BundleOptions, BundlePackager, BundleReport};
use maestro_core::config::{ClientConfig, ConfigOverrides, ConfigStore};
use maestro_core::context::AppContext;
use maestro_core::deploy::{DeployMode, DeployOptions, DeployReport, parse_env_assignment};
use maestro_core::status::{RemoteState, StatusReport, collect_status};

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Deploy agents to the Maestro service", long_about = None)]
struct Cli {
    #[command(flatten)]
    api: ApiArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection settings; each overrides the config file and environment.
#[derive(Args, Default)]
struct ApiArgs {
    /// API base URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Authentication token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Organization ID (UUID)
    #[arg(long = "org-id", global = true)]
    org_id: Option<String>,
}

impl ApiArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.url.clone(),
            token: self.token.clone(),
            organization_id: self.org_id.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a Python script or a bundle directory
    ///
    /// The mode is detected from .maestro_state.json and the service:
    /// create when nothing exists, update when both the definition and the
    /// agent exist, redeploy when only the definition is left.
    Deploy(DeployArgs),

    /// Show the recorded deployment for the current directory
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List agents in the organization
    ListAgents {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List agent definitions in the organization
    ListDefinitions {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Package a directory into a bundle without uploading it
    Bundle {
        /// Source directory
        dir: PathBuf,

        /// Archive path (default: a fresh temporary directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ship requirements.txt instead of installing dependencies
        #[arg(long)]
        no_install: bool,
    },

    /// Run an agent synchronously and print the execution result
    Run {
        /// Agent ID
        agent_id: Uuid,

        /// Input variables as a JSON object
        #[arg(short, long, value_name = "JSON", conflicts_with = "file")]
        input: Option<String>,

        /// JSON file holding the input variables
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Executor type (e.g. modal, azure)
        #[arg(short, long)]
        executor: Option<String>,
    },

    /// Download the bundle archive of an agent definition
    DownloadBundle {
        /// Agent definition ID
        definition_id: Uuid,

        /// Where to write the archive
        #[arg(short, long, default_value = "agent_definition_bundle.zip")]
        output: PathBuf,
    },

    /// Save --url, --token and --org-id to the config file
    Setup,

    /// Print the client version
    Version,
}

#[derive(Args)]
struct DeployArgs {
    /// Script (.py) or directory to deploy
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Agent name (default: file stem or directory name)
    #[arg(short, long)]
    name: Option<String>,

    /// Description for the definition and agent
    #[arg(short, long = "desc")]
    description: Option<String>,

    /// Agent type
    #[arg(short = 't', long, default_value = "script")]
    agent_type: String,

    /// Force a mode (create, update, redeploy) instead of detecting it
    #[arg(long)]
    mode: Option<String>,

    /// Deploy the definition only, without an agent
    #[arg(long)]
    definition_only: bool,

    /// JSON file with input/output/memory schemas
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Environment variable (KEY=VALUE), repeatable
    #[arg(short, long, value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Ship requirements.txt instead of installing dependencies
    #[arg(long)]
    no_install: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maestro=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            println!("maestro {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Setup => run_setup(&cli.api),
        Commands::Bundle {
            dir,
            output,
            no_install,
        } => block_on(run_bundle(dir, output, no_install)),
        Commands::Deploy(args) => {
            let ctx = context(&cli.api, project_dir(&args.path))?;
            block_on(run_deploy(&ctx, args))
        }
        Commands::Status { format } => {
            let ctx = context(&cli.api, std::env::current_dir().context("No working directory")?)?;
            block_on(run_status(&ctx, format))
        }
        Commands::ListAgents { format } => {
            let ctx = context(&cli.api, PathBuf::from("."))?;
            block_on(run_list_agents(&ctx, format))
        }
        Commands::ListDefinitions { format } => {
            let ctx = context(&cli.api, PathBuf::from("."))?;
            block_on(run_list_definitions(&ctx, format))
        }
        Commands::Run {
            agent_id,
            input,
            file,
            executor,
        } => {
            let variables = parse_variables(input.as_deref(), file.as_deref())?;
            let ctx = context(&cli.api, PathBuf::from("."))?;
            block_on(run_agent(&ctx, agent_id, variables, executor))
        }
        Commands::DownloadBundle {
            definition_id,
            output,
        } => {
            let ctx = context(&cli.api, PathBuf::from("."))?;
            block_on(run_download_bundle(&ctx, definition_id, output))
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(future)
}

fn resolve_config(api: &ApiArgs) -> Result<(ConfigStore, ClientConfig)> {
    let store = ConfigStore::from_default_dir()?;
    let stored = store.load()?;
    let config = ClientConfig::resolve(&api.overrides(), &stored)?;
    Ok((store, config))
}

fn context(api: &ApiArgs, project_dir: PathBuf) -> Result<AppContext> {
    let (_, config) = resolve_config(api)?;
    Ok(AppContext::new(config, project_dir))
}

fn project_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

// =============================================================================
// Commands
// =============================================================================

fn run_setup(api: &ApiArgs) -> Result<()> {
    let (store, config) = resolve_config(api)?;
    store
        .save(&config.to_stored())
        .context("Failed to save configuration")?;
    println!("✓ Saved configuration to {}", store.config_path().display());
    println!("  API URL: {}", config.base_url);
    println!("  Organization: {}", config.organization_id);
    Ok(())
}

async fn run_deploy(ctx: &AppContext, args: DeployArgs) -> Result<()> {
    let mut options = DeployOptions::new()
        .with_agent_type(&args.agent_type)
        .with_create_agent(!args.definition_only)
        .with_install_dependencies(!args.no_install);
    if let Some(name) = &args.name {
        options = options.with_name(name);
    }
    if let Some(description) = &args.description {
        options = options.with_description(description);
    }
    if let Some(mode) = &args.mode {
        options = options.with_mode(mode.parse::<DeployMode>()?);
    }
    if let Some(schema) = &args.schema_file {
        options = options.with_schema_file(schema);
    }
    for pair in &args.env {
        let (key, value) = parse_env_assignment(pair)?;
        options = options.with_env(key, value);
    }

    let report = ctx
        .orchestrator()
        .deploy(&args.path, &options)
        .await
        .with_context(|| format!("Deployment of '{}' failed", args.path.display()))?;
    ctx.close();

    print_deploy_report(&report);
    if let Some(e) = &report.instance_error {
        anyhow::bail!(
            "Definition '{}' was deployed but the agent step failed: {}",
            report.definition.name,
            e
        );
    }
    Ok(())
}

fn print_deploy_report(report: &DeployReport) {
    let verb = match report.mode {
        DeployMode::Create => "Created",
        DeployMode::Update => "Updated",
        DeployMode::Redeploy => "Redeployed",
    };
    println!(
        "✓ {} definition '{}' ({})",
        verb, report.definition.name, report.definition.id
    );
    if let Some(agent) = &report.agent {
        println!("✓ Agent '{}' ({})", agent.name, agent.id);
    }
    if let Some(bundle) = &report.bundle {
        println!(
            "  Bundle: {} files, dependencies {}",
            bundle.entries.len(),
            bundle.dependencies
        );
    }
    for warning in &report.warnings {
        println!("  ⚠ {}", warning);
    }
    println!("  State: {}", report.state_path.display());
}

async fn run_bundle(dir: PathBuf, output: Option<PathBuf>, no_install: bool) -> Result<()> {
    let mut options = BundleOptions::new().with_install_dependencies(!no_install);
    if let Some(output) = output {
        options = options.with_output(output);
    }
    let report = BundlePackager::default()
        .package(&dir, &options)
        .await
        .with_context(|| format!("Failed to package '{}'", dir.display()))?;
    print_bundle_report(&report);
    Ok(())
}

fn print_bundle_report(report: &BundleReport) {
    println!("✓ Created bundle {}", report.path.display());
    println!("  Files: {}", report.entries.len());
    println!("  Dependencies: {}", report.dependencies);
    if report.manifest_preserved {
        println!("  Manifest: kept from source");
    }
    println!("  Digest: {}", report.digest);
    for warning in &report.warnings {
        println!("  ⚠ {}", warning);
    }
}

async fn run_status(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let agents = ctx.agents();
    let report = collect_status(&ctx.project_state_store(), &agents, &ctx.utils()).await?;
    match format {
        OutputFormat::Table => print_status(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_status(report: &StatusReport) {
    println!(
        "Service: {}",
        if report.service_healthy {
            "healthy"
        } else {
            "unreachable"
        }
    );
    if !report.has_state() {
        println!("No deployment recorded in {}", report.state_path.display());
        println!("Deploy with: maestro deploy <path>");
        return;
    }

    let state = &report.state;
    println!("Agent: {}", state.agent_name.as_deref().unwrap_or("-"));
    println!(
        "Definition: {} [{}]",
        display_id(state.agent_definition_id),
        remote_label(report.definition)
    );
    println!(
        "Agent ID: {} [{}]",
        display_id(state.agent_id),
        remote_label(report.agent)
    );
    if let Some(mode) = state.last_deploy_mode {
        println!("Last mode: {}", mode);
    }
    if let Some(at) = &state.last_deployed_at {
        println!("Last deployed: {}", at);
    }
}

fn display_id(id: Option<uuid::Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

fn remote_label(state: RemoteState) -> &'static str {
    match state {
        RemoteState::NotRecorded => "not recorded",
        RemoteState::Exists => "exists",
        RemoteState::Missing => "missing",
    }
}

async fn run_list_agents(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let agents = ctx.agents().list_agents(None).await?;
    match format {
        OutputFormat::Table => print_agent_table(&agents),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&agents)?),
    }
    Ok(())
}

fn print_agent_table(agents: &[Agent]) {
    if agents.is_empty() {
        println!("No agents found.");
        return;
    }
    println!("{:<38} {:<24} {:<10} Definition", "ID", "Name", "Type");
    println!("{}", "-".repeat(110));
    for agent in agents {
        println!(
            "{:<38} {:<24} {:<10} {}",
            agent.id,
            agent.name,
            agent.agent_type.as_deref().unwrap_or("-"),
            display_id(agent.agent_definition_id)
        );
    }
}

async fn run_list_definitions(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let definitions = ctx.agents().list_definitions(None).await?;
    match format {
        OutputFormat::Table => print_definition_table(&definitions),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&definitions)?),
    }
    Ok(())
}

fn print_definition_table(definitions: &[AgentDefinition]) {
    if definitions.is_empty() {
        println!("No agent definitions found.");
        return;
    }
    println!("{:<38} {:<24} {:<8} Description", "ID", "Name", "Bundle");
    println!("{}", "-".repeat(100));
    for def in definitions {
        println!(
            "{:<38} {:<24} {:<8} {}",
            def.id,
            def.name,
            if def.is_bundle.unwrap_or(false) { "yes" } else { "no" },
            def.description.as_deref().unwrap_or("")
        );
    }
}

/// Input variables from `--input` or `--file`; both must hold a JSON object.
fn parse_variables(input: Option<&str>, file: Option<&Path>) -> Result<JsonMap> {
    let (text, origin) = match (input, file) {
        (Some(text), _) => (text.to_string(), "--input".to_string()),
        (None, Some(path)) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            path.display().to_string(),
        ),
        (None, None) => return Ok(JsonMap::new()),
    };
    match serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", origin))? {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("Input variables must be a JSON object, got: {}", other),
    }
}

async fn run_agent(
    ctx: &AppContext,
    agent_id: Uuid,
    variables: JsonMap,
    executor: Option<String>,
) -> Result<()> {
    let result = ctx
        .agents()
        .execute_agent_sync(agent_id, variables, executor.as_deref())
        .await
        .with_context(|| format!("Failed to run agent {}", agent_id))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_download_bundle(ctx: &AppContext, definition_id: Uuid, output: PathBuf) -> Result<()> {
    let bytes = ctx
        .agents()
        .download_definition_bundle(definition_id)
        .await
        .with_context(|| format!("Failed to download bundle of definition {}", definition_id))?;
    std::fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("✓ Downloaded bundle to {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}
