// crates/mindscape-gateway-cli/src/main.rs
// ============================================================================
// Module: Mindscape Gateway CLI Entry Point
// Description: Command dispatcher for the MCP gateway binary.
// Purpose: Run the gateway server and expose naming and policy utilities.
// Dependencies: clap, mindscape-gateway-config, mindscape-gateway-core, mindscape-gateway-mcp, tokio
// ============================================================================

//! ## Overview
//! `mindscape-gateway` serves the MCP gateway and offers operator utilities:
//! config validation, MCP name encoding and decoding, and offline policy
//! classification. Utility commands never contact the backend.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use mindscape_gateway_config::GatewayConfig;
use mindscape_gateway_config::ServerTransport;
use mindscape_gateway_core::AccessDecision;
use mindscape_gateway_core::ClassificationReason;
use mindscape_gateway_core::ToolAccessPolicy;
use mindscape_gateway_core::ToolIdentity;
use mindscape_gateway_core::ToolLayer;
use mindscape_gateway_core::from_mcp_name;
use mindscape_gateway_core::to_mcp_name;
use mindscape_gateway_mcp::McpServer;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "mindscape-gateway", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP gateway server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// MCP tool name utilities.
    Name {
        /// Selected name subcommand.
        #[command(subcommand)]
        command: NameCommand,
    },
    /// Access policy utilities.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to mindscape-gateway.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Check(ConfigCheckCommand),
}

/// Arguments for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path (defaults to mindscape-gateway.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Name subcommands.
#[derive(Subcommand, Debug)]
enum NameCommand {
    /// Encode a canonical `pack.action` identity as an MCP tool name.
    Encode(NameEncodeCommand),
    /// Decode an MCP tool name into its layer and identity.
    Decode(NameDecodeCommand),
}

/// Arguments for `name encode`.
#[derive(Args, Debug)]
struct NameEncodeCommand {
    /// Naming layer.
    #[arg(long, value_enum, default_value_t = LayerArg::Tool)]
    layer: LayerArg,
    /// Canonical identity, e.g. `wordpress.list_posts`.
    canonical: String,
}

/// Arguments for `name decode`.
#[derive(Args, Debug)]
struct NameDecodeCommand {
    /// MCP tool name, e.g. `mindscape_tool_wordpress_list_posts`.
    name: String,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Classify a canonical identity without contacting the backend.
    Classify(PolicyClassifyCommand),
}

/// Arguments for `policy classify`.
#[derive(Args, Debug)]
struct PolicyClassifyCommand {
    /// Config file supplying the policy; the built-in policy is used when absent.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Naming layer the identity is addressed through.
    #[arg(long, value_enum, default_value_t = LayerArg::Tool)]
    layer: LayerArg,
    /// Canonical identity, e.g. `wordpress.delete_page`.
    canonical: String,
}

/// Naming layer selection.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum LayerArg {
    /// Backend tool.
    Tool,
    /// Backend playbook.
    Playbook,
    /// Playbook run.
    Run,
    /// Read-only lens.
    Lens,
}

impl From<LayerArg> for ToolLayer {
    fn from(value: LayerArg) -> Self {
        match value {
            LayerArg::Tool => Self::Tool,
            LayerArg::Playbook => Self::Playbook,
            LayerArg::Run => Self::Run,
            LayerArg::Lens => Self::Lens,
        }
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// JSON report for `name decode`.
#[derive(Debug, Serialize)]
struct NameReport {
    /// Decoded layer.
    layer: ToolLayer,
    /// Pack namespace.
    pack: String,
    /// Action name.
    action: String,
    /// Canonical `pack.action`.
    canonical: String,
}

/// JSON report for `policy classify`.
#[derive(Debug, Serialize)]
struct ClassifyReport {
    /// Canonical identity classified.
    canonical: String,
    /// Layer used for classification.
    layer: ToolLayer,
    /// Encoded MCP name.
    mcp_name: String,
    /// Listing-time decision.
    decision: AccessDecision,
    /// Rule that produced the tier.
    reason: ClassificationReason,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command: ConfigCommand::Check(command),
        } => command_config_check(&command),
        Commands::Name {
            command,
        } => command_name(command),
        Commands::Policy {
            command: PolicyCommand::Classify(command),
        } => command_policy_classify(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = GatewayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let server = McpServer::from_config(config)
        .map_err(|err| CliError::new(format!("failed to initialize server: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes `config check`.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = GatewayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line(&config_summary(&config))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// One-line summary of a validated config.
fn config_summary(config: &GatewayConfig) -> String {
    let transport = match config.server.transport {
        ServerTransport::Stdio => "stdio",
        ServerTransport::Http => "http",
    };
    format!(
        "config ok: transport={transport} backend={} policy_rules={} confirmation={}",
        config.backend.base_url.trim(),
        config.policy.rules.len(),
        if config.confirmation.verifying_key.is_some() { "ed25519" } else { "deny_all" },
    )
}

// ============================================================================
// SECTION: Name Commands
// ============================================================================

/// Dispatches name subcommands.
fn command_name(command: NameCommand) -> CliResult<ExitCode> {
    let output = match command {
        NameCommand::Encode(command) => {
            let (name, round_trips) = encode_name(&command.canonical, command.layer.into())?;
            if !round_trips {
                write_stderr_line(&format!(
                    "warning: {name} does not decode back to {}",
                    command.canonical.trim()
                ))
                .map_err(|err| CliError::new(output_error("stderr", &err)))?;
            }
            name
        }
        NameCommand::Decode(command) => decode_name(&command.name)?,
    };
    write_stdout_line(&output).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Encodes a canonical identity and reports whether decoding recovers it.
fn encode_name(canonical: &str, layer: ToolLayer) -> CliResult<(String, bool)> {
    let canonical = canonical.trim();
    if canonical.is_empty() {
        return Err(CliError::new("canonical identity must be non-empty".to_string()));
    }
    let identity = ToolIdentity::parse_canonical(canonical);
    let name = to_mcp_name(&identity, layer);
    let round_trips = from_mcp_name(&name)
        .is_ok_and(|decoded| decoded.layer == layer && decoded.identity == identity);
    Ok((name, round_trips))
}

/// Decodes an MCP name into a pretty JSON report.
fn decode_name(name: &str) -> CliResult<String> {
    let decoded = from_mcp_name(name.trim())
        .map_err(|err| CliError::new(format!("invalid tool name: {err}")))?;
    let report = NameReport {
        layer: decoded.layer,
        pack: decoded.identity.pack().to_string(),
        action: decoded.identity.action().to_string(),
        canonical: decoded.identity.canonical().to_string(),
    };
    serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::new(format!("failed to serialize report: {err}")))
}

// ============================================================================
// SECTION: Policy Commands
// ============================================================================

/// Executes `policy classify`.
fn command_policy_classify(command: &PolicyClassifyCommand) -> CliResult<ExitCode> {
    let policy = match &command.config {
        Some(path) => GatewayConfig::load(Some(path))
            .and_then(|config| config.policy.build_policy())
            .map_err(|err| CliError::new(format!("failed to load policy: {err}")))?,
        None => ToolAccessPolicy::default(),
    };
    let output = classify(&policy, &command.canonical, command.layer.into())?;
    write_stdout_line(&output).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Classifies one identity and renders the report as pretty JSON.
fn classify(policy: &ToolAccessPolicy, canonical: &str, layer: ToolLayer) -> CliResult<String> {
    let canonical = canonical.trim();
    if canonical.is_empty() {
        return Err(CliError::new("canonical identity must be non-empty".to_string()));
    }
    let identity = ToolIdentity::parse_canonical(canonical);
    let classification = policy.classify(&identity, layer);
    let report = ClassifyReport {
        canonical: identity.canonical().to_string(),
        layer,
        mcp_name: to_mcp_name(&identity, layer),
        decision: AccessDecision::for_listing(classification.tier),
        reason: classification.reason,
    };
    serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::new(format!("failed to serialize report: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
