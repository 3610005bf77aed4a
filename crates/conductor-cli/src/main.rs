//! `conductor` command-line entry point.

mod demo;

use anyhow::Context;
use clap::{Parser, Subcommand};
use conductor_a2a::{DelegationClient, MemoryTaskStore, RegistryConfig, SpecialistServer, TaskRegistry};
use conductor_core::{AgentKind, TaskStatus};
use conductor_orchestrator::{Connection, Orchestrator, OrchestratorConfig};
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "conductor.toml";

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor: delegate requests to specialist agents")]
struct Cli {
    /// Path to config file (falls back to $CONDUCTOR_CONFIG, then ./conductor.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Orchestrate one request across the specialists
    Run {
        request: String,
        /// Reuse a conversation context id
        #[arg(long)]
        context_id: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe every configured specialist
    Status,
    /// Cancel a task on a specialist
    Cancel { agent: AgentKind, task_id: String },
    /// Follow the status events of a remote task
    Watch { agent: AgentKind, task_id: String },
    /// Run a demo specialist that echoes requests in its agent's result shape
    Serve {
        #[arg(long)]
        agent: AgentKind,
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (defaults to the port of the agent's configured endpoint)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Deserialize, Default)]
struct ConductorConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    #[serde(default)]
    specialist: SpecialistConfig,
}

#[derive(Deserialize)]
struct SpecialistConfig {
    #[serde(default = "default_host")]
    host: String,
    /// Write records through to an in-process expiring store.
    #[serde(default)]
    persist: bool,
    #[serde(default)]
    registry: RegistryConfig,
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            persist: false,
            registry: RegistryConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// An explicit path must exist; the implicit default may be absent.
fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<ConductorConfig> {
    let explicit = explicit.or_else(|| std::env::var_os("CONDUCTOR_CONFIG").map(PathBuf::from));
    let path = match explicit {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => return Ok(ConductorConfig::default()),
    };
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config(&source).with_context(|| format!("Invalid config file '{}'", path.display()))
}

fn parse_config(source: &str) -> anyhow::Result<ConductorConfig> {
    Ok(toml::from_str(source)?)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Port of an endpoint such as `http://localhost:8001`.
fn endpoint_port(address: &str) -> Option<u16> {
    address
        .trim_end_matches('/')
        .rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Run {
            request,
            context_id,
            json,
        } => {
            let orchestrator = Orchestrator::new(config.orchestrator)?;
            let result = orchestrator.run(&request, context_id.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.artifact.content);
                println!(
                    "\n[context {} | {} subtask(s) in {} wave(s) | {} ms]",
                    result.context_id,
                    result.subtasks.len(),
                    result.waves.len(),
                    result.duration_ms
                );
            }
        }
        Commands::Status => {
            let orchestrator = Orchestrator::new(config.orchestrator)?;
            for agent in orchestrator.agent_status().await {
                let mark = match agent.status {
                    Connection::Connected => "connected",
                    Connection::Disconnected => "disconnected",
                };
                println!("{:<10} {mark:<13} {}", agent.agent.as_str(), agent.url);
            }
        }
        Commands::Cancel { agent, task_id } => {
            let orchestrator = Orchestrator::new(config.orchestrator)?;
            if orchestrator.cancel(agent, &task_id).await {
                println!("Cancelled {task_id} on {agent}");
            } else {
                anyhow::bail!("{agent} did not acknowledge cancellation of {task_id}");
            }
        }
        Commands::Watch { agent, task_id } => {
            let client = DelegationClient::new(config.orchestrator.client.clone());
            let address = config.orchestrator.agents.address(agent);
            let mut events = client.stream_events(address, &task_id).await?;
            while let Some(event) = events.next().await {
                let event = event?;
                match event.status {
                    TaskStatus::Completed => println!(
                        "{} {}: {}",
                        event.timestamp,
                        event.status,
                        event.result.unwrap_or_default()
                    ),
                    status if status.is_terminal() => println!(
                        "{} {}: {}",
                        event.timestamp,
                        status,
                        event.error.unwrap_or_default()
                    ),
                    status => println!("{} {status}", event.timestamp),
                }
            }
            client.close();
        }
        Commands::Serve { agent, host, port } => {
            let host = host.unwrap_or(config.specialist.host);
            let port = port
                .or_else(|| endpoint_port(config.orchestrator.agents.address(agent)))
                .context("No port given and the configured endpoint has none")?;

            let mut registry = TaskRegistry::new(config.specialist.registry);
            if config.specialist.persist {
                registry = registry.with_store(Arc::new(MemoryTaskStore::new()));
            }
            let registry = Arc::new(registry);
            let _sweeper = registry.spawn_sweeper();

            let app = SpecialistServer::build(
                agent.as_str(),
                registry,
                Arc::new(demo::EchoSpecialist::new(agent)),
            );

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(agent = %agent, "Specialist listening on {addr}");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.specialist.host, "0.0.0.0");
        assert!(!config.specialist.persist);
        assert_eq!(config.orchestrator.collection_deadline_secs, 60);
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [orchestrator]
            collection_deadline_secs = 10

            [orchestrator.agents]
            code = "http://code.internal:9102"

            [specialist]
            host = "127.0.0.1"
            persist = true

            [specialist.registry]
            wait_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.collection_deadline_secs, 10);
        assert_eq!(
            config.orchestrator.agents.address(AgentKind::Code),
            "http://code.internal:9102"
        );
        assert!(config.specialist.persist);
        assert_eq!(config.specialist.registry.wait_timeout_secs, 5);
        assert_eq!(config.specialist.registry.poll_interval_ms, 100);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(Some(missing)).err().unwrap();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_endpoint_port() {
        assert_eq!(endpoint_port("http://localhost:8001"), Some(8001));
        assert_eq!(endpoint_port("http://localhost:8003/"), Some(8003));
        assert_eq!(endpoint_port("http://localhost"), None);
    }

    #[test]
    fn test_cli_parses_agent() {
        let cli = Cli::try_parse_from(["conductor", "serve", "--agent", "code", "-p", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { agent, port, .. } => {
                assert_eq!(agent, AgentKind::Code);
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected serve"),
        }
    }
}
