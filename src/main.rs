use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use vmstate::config::{Config, ConnectionConfig, ConnectionProfile, PASSWORD_ENV};
use vmstate::manager::transport_node::TransportNodes;
use vmstate::manager::{revision_of, ManagerResource};
use vmstate::nsxt::{ListParams, NsxtClient};
use vmstate::policy::{ExecutionLog, PolicyResource, WalkOptions};
use vmstate::state::{self, StateContext, StateResult};

/// Declarative state for NSX-T networking resources
#[derive(Parser, Debug)]
#[command(name = "vmstate", version = vmstate::VERSION, about, long_about = None)]
struct Args {
    /// Saved connection profile to use
    #[arg(long, global = true, env = "VMSTATE_PROFILE")]
    profile: Option<String>,

    /// NSX-T manager hostname or IP
    #[arg(long, global = true, env = "VMSTATE_NSXT_HOSTNAME")]
    hostname: Option<String>,

    #[arg(long, global = true, env = "VMSTATE_NSXT_USERNAME")]
    username: Option<String>,

    /// Password (or set VMSTATE_NSXT_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// PEM root certificate of the manager
    #[arg(long, global = true)]
    cert: Option<PathBuf>,

    /// Common name the manager certificate was issued for
    #[arg(long, global = true)]
    cert_common_name: Option<String>,

    /// Skip certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Log level for debugging
    #[arg(long, global = true, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[arg(long, global = true, value_enum, default_value = "json")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tier-0 / Tier-1 gateways and segments (Policy API)
    Policy {
        /// tier0, tier1 or segments
        resource: String,
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Flat Manager API resources (ip_pools, transport_zones, ...)
    Manager {
        resource: String,
        #[command(subcommand)]
        action: ManagerAction,
    },
    /// Host and edge transport nodes
    TransportNode {
        #[command(subcommand)]
        action: TransportNodeAction,
    },
    /// Save the connection flags as a named profile
    SaveProfile {
        name: String,
        /// Use this profile when --profile is not given
        #[arg(long)]
        default: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyAction {
    Get {
        #[command(flatten)]
        params: ListParams,
    },
    GetByName {
        display_name: String,
    },
    CreateOrUpdate {
        #[arg(long)]
        spec: PathBuf,
        /// Create sub-resources before their parent
        #[arg(long)]
        children_first: bool,
    },
    Delete {
        id: String,
    },
    Hierarchy {
        id: String,
    },
    Present {
        name: String,
        #[arg(long)]
        spec: Option<PathBuf>,
        #[arg(long)]
        test: bool,
        #[arg(long)]
        children_first: bool,
    },
    Absent {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        test: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ManagerAction {
    Get {
        #[command(flatten)]
        params: ListParams,
        /// Resource specific query parameter, key=value
        #[arg(long = "param", value_parser = parse_key_val)]
        extra: Vec<(String, String)>,
    },
    GetByName {
        display_name: String,
    },
    Create {
        #[arg(long)]
        spec: PathBuf,
    },
    Update {
        id: String,
        #[arg(long)]
        spec: PathBuf,
    },
    Delete {
        id: String,
    },
    Present {
        name: String,
        #[arg(long)]
        spec: Option<PathBuf>,
        #[arg(long)]
        test: bool,
    },
    Absent {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        test: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TransportNodeAction {
    Get {
        #[command(flatten)]
        params: ListParams,
    },
    GetByName {
        display_name: String,
    },
    /// Realization state of one node
    State {
        id: String,
    },
    Present {
        name: String,
        #[arg(long)]
        spec: Option<PathBuf>,
        #[arg(long)]
        test: bool,
    },
    Absent {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        test: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {}", s))
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("vmstate started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("vmstate").join("vmstate.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".vmstate").join("vmstate.log");
    }
    PathBuf::from("vmstate.log")
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text);
    Ok(())
}

/// Read a YAML or JSON spec file; no file means an empty spec
fn read_spec(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Object(Default::default()));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("Failed to parse spec {}", path.display()))
}

fn overrides(args: &Args) -> ConnectionProfile {
    ConnectionProfile {
        hostname: args.hostname.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        cert: args.cert.clone(),
        cert_common_name: args.cert_common_name.clone(),
        verify_ssl: args.insecure.then_some(false),
    }
}

async fn connect(args: &Args, config: &Config) -> Result<NsxtClient> {
    let profile = config.profile(args.profile.as_deref());
    if args.profile.is_some() && profile.is_none() {
        anyhow::bail!("Unknown profile: {}", args.profile.as_deref().unwrap_or_default());
    }
    let connection = ConnectionConfig::resolve(
        profile,
        &overrides(args),
        std::env::var(PASSWORD_ENV).ok(),
    )?;
    tracing::debug!("Connecting with {:?}", connection);
    NsxtClient::connect(&connection)
        .await
        .with_context(|| format!("Failed to set up client for {}", connection.hostname))
}

fn log_exit(log: &ExecutionLog) -> ExitCode {
    if log.last_error().is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn state_exit(result: &StateResult) -> ExitCode {
    tracing::info!(
        "state {} finished in {}ms with result {:?}",
        result.name,
        result.elapsed().num_milliseconds(),
        result.result
    );
    if result.result == Some(false) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_policy(
    client: &NsxtClient,
    resource: PolicyResource,
    action: PolicyAction,
    format: OutputFormat,
) -> Result<ExitCode> {
    match action {
        PolicyAction::Get { params } => print(&resource.get(client, &params).await?, format)?,
        PolicyAction::GetByName { display_name } => print(
            &resource.get_by_display_name(client, &display_name).await?,
            format,
        )?,
        PolicyAction::CreateOrUpdate {
            spec,
            children_first,
        } => {
            let spec = read_spec(Some(&spec))?;
            let log = resource
                .create_or_update(client, &spec, WalkOptions { children_first })
                .await;
            print(&log, format)?;
            return Ok(log_exit(&log));
        }
        PolicyAction::Delete { id } => {
            let log = resource.delete(client, &id).await;
            print(&log, format)?;
            return Ok(log_exit(&log));
        }
        PolicyAction::Hierarchy { id } => print(&resource.get_hierarchy(client, &id).await?, format)?,
        PolicyAction::Present {
            name,
            spec,
            test,
            children_first,
        } => {
            let spec = read_spec(spec.as_deref())?;
            let result = state::policy::present(
                client,
                StateContext { test },
                resource,
                &name,
                &spec,
                WalkOptions { children_first },
            )
            .await;
            print(&result, format)?;
            return Ok(state_exit(&result));
        }
        PolicyAction::Absent {
            name,
            display_name,
            test,
        } => {
            let result = state::policy::absent(
                client,
                StateContext { test },
                resource,
                &name,
                display_name.as_deref(),
            )
            .await;
            print(&result, format)?;
            return Ok(state_exit(&result));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_manager(
    client: &NsxtClient,
    resource: ManagerResource,
    action: ManagerAction,
    format: OutputFormat,
) -> Result<ExitCode> {
    match action {
        ManagerAction::Get { mut params, extra } => {
            params.extra = extra;
            print(&resource.get(client, &params).await?, format)?;
        }
        ManagerAction::GetByName { display_name } => print(
            &resource
                .get_by_display_name(client, &display_name, &ListParams::default())
                .await?,
            format,
        )?,
        ManagerAction::Create { spec } => {
            let spec = read_spec(Some(&spec))?;
            print(&resource.create(client, &spec).await?, format)?;
        }
        ManagerAction::Update { id, spec } => {
            let spec = read_spec(Some(&spec))?;
            let existing = resource.get_by_id(client, &id).await?;
            let body = resource.merged_update(&existing, &spec);
            print(
                &resource
                    .update(client, &id, revision_of(&existing), &body)
                    .await?,
                format,
            )?;
        }
        ManagerAction::Delete { id } => print(&resource.delete(client, &id).await?, format)?,
        ManagerAction::Present { name, spec, test } => {
            let spec = read_spec(spec.as_deref())?;
            let result =
                state::manager::present(client, StateContext { test }, resource, &name, &spec)
                    .await;
            print(&result, format)?;
            return Ok(state_exit(&result));
        }
        ManagerAction::Absent {
            name,
            display_name,
            test,
        } => {
            let result = state::manager::absent(
                client,
                StateContext { test },
                resource,
                &name,
                display_name.as_deref(),
            )
            .await;
            print(&result, format)?;
            return Ok(state_exit(&result));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_transport_node(
    client: &NsxtClient,
    action: TransportNodeAction,
    format: OutputFormat,
) -> Result<ExitCode> {
    let nodes = TransportNodes::new()?;
    match action {
        TransportNodeAction::Get { params } => print(&nodes.get(client, &params).await?, format)?,
        TransportNodeAction::GetByName { display_name } => {
            print(&nodes.get_by_display_name(client, &display_name).await?, format)?
        }
        TransportNodeAction::State { id } => print(&nodes.get_state(client, &id).await?, format)?,
        TransportNodeAction::Present { name, spec, test } => {
            let spec = read_spec(spec.as_deref())?;
            let result =
                state::transport_node::present(client, StateContext { test }, &name, &spec).await;
            print(&result, format)?;
            return Ok(state_exit(&result));
        }
        TransportNodeAction::Absent {
            name,
            display_name,
            test,
        } => {
            let result = state::transport_node::absent(
                client,
                StateContext { test },
                &name,
                display_name.as_deref(),
            )
            .await;
            print(&result, format)?;
            return Ok(state_exit(&result));
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let mut config = Config::load();

    if let Command::SaveProfile { name, default } = &args.command {
        if *default {
            config.default_profile = Some(name.clone());
        }
        config
            .set_profile(name, overrides(&args))
            .context("Failed to save configuration")?;
        println!("Saved profile {}", name);
        return Ok(ExitCode::SUCCESS);
    }

    let client = connect(&args, &config).await?;
    let format = args.output;

    match args.command {
        Command::Policy { resource, action } => {
            let resource = PolicyResource::lookup(&resource)?;
            run_policy(&client, resource, action, format).await
        }
        Command::Manager { resource, action } => {
            let resource = ManagerResource::lookup(&resource)?;
            run_manager(&client, resource, action, format).await
        }
        Command::TransportNode { action } => run_transport_node(&client, action, format).await,
        Command::SaveProfile { .. } => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_connection_flags_read_environment() {
        let command = Args::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_string)
        };
        assert_eq!(env_of("profile").as_deref(), Some("VMSTATE_PROFILE"));
        assert_eq!(env_of("hostname").as_deref(), Some("VMSTATE_NSXT_HOSTNAME"));
        assert_eq!(env_of("username").as_deref(), Some("VMSTATE_NSXT_USERNAME"));
        assert_eq!(env_of("password"), None);
    }

    #[test]
    fn test_policy_present_parses() {
        let args = Args::try_parse_from([
            "vmstate",
            "--hostname",
            "nsxt.lab",
            "policy",
            "tier0",
            "present",
            "t0-gw",
            "--test",
            "--children-first",
        ])
        .unwrap();
        assert_eq!(args.hostname.as_deref(), Some("nsxt.lab"));
        let Command::Policy { resource, action } = args.command else {
            panic!("expected policy command");
        };
        assert_eq!(resource, "tier0");
        assert!(matches!(
            action,
            PolicyAction::Present { test: true, children_first: true, .. }
        ));
    }
}
