//! MedOrch command-line host.
//!
//! Usage:
//!   medorch route "diagnose a 55 yo female with chest pain"
//!   medorch route --json --session s1 "I feel anxious"
//!   medorch chat --session s1
//!   medorch agents
//!   medorch self-test
//!   medorch --config medorch.toml -v route "create 3 synthetic patients"
//!
//! # Environment Variables
//!
//! - `MEDORCH_CONFIG` - Path to a TOML configuration file
//! - `MEDORCH_DISABLED_AGENTS` - Comma-separated agent ids to disable
//! - `RUST_LOG` - Log filter (overrides `-v`)
//!
//! # Exit Codes
//!
//! - `0` - success (including partial responses)
//! - `1` - configuration, execution or I/O failure
//! - `2` - the request could not be parsed or dispatched

use anyhow::Context;
use clap::{Parser, Subcommand};
use medorch_agents::builtin_registrations;
use medorch_common::{new_session_id, Response, RouterError};
use medorch_coordinator::{Router, RouterConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "medorch", version, about = "Route medical requests to specialist agents")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "MEDORCH_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route a single request
    Route {
        /// Free-text request, optionally with an embedded JSON object
        text: String,

        /// Conversation session id
        #[arg(long, short)]
        session: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session; one request per line, `exit` to quit
    Chat {
        /// Session id to reuse (a fresh one is generated otherwise)
        #[arg(long, short)]
        session: Option<String>,
    },

    /// List registered agents
    Agents,

    /// Run one canned request per built-in agent
    SelfTest,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let rejected = e
                .downcast_ref::<RouterError>()
                .is_some_and(RouterError::is_rejection);
            if rejected {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "info,medorch_coordinator=debug,medorch_agents=debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RouterConfig> {
    let config = match path {
        Some(path) => RouterConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RouterConfig::default(),
    };
    Ok(config.with_env_overrides())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    let router = Router::new(config, builtin_registrations())?;
    debug!(router = ?router, "Router ready");

    match cli.command {
        Command::Route {
            text,
            session,
            json,
        } => {
            let response = router.route(&text, session.as_deref()).await?;
            print_response(&response, json)?;
        }
        Command::Chat { session } => {
            let session = session.unwrap_or_else(new_session_id);
            chat(&router, &session).await?;
        }
        Command::Agents => {
            for agent in router.agents() {
                let capabilities = agent
                    .capabilities
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let status = match &agent.reason {
                    Some(reason) => format!("{} ({})", agent.status, reason),
                    None => agent.status.to_string(),
                };
                println!(
                    "{:<16} {:<22} {:<16} {}{}",
                    agent.id,
                    agent.name,
                    capabilities,
                    status,
                    if agent.session_bound { " [session]" } else { "" }
                );
            }
        }
        Command::SelfTest => {
            let report = router.self_test().await;
            for check in &report.checks {
                let verdict = if check.passed { "PASS" } else { "FAIL" };
                println!("[{}] {}", verdict, check.request);
                for line in check.detail.lines() {
                    println!("       {}", line);
                }
            }
            if !report.passed() {
                println!("{} of {} checks failed", report.failures().count(), report.checks.len());
                return Ok(ExitCode::FAILURE);
            }
            println!("all {} checks passed", report.checks.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_response(response: &Response, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        println!("{}", response.text);
    }
    Ok(())
}

async fn chat(router: &Router, session: &str) -> anyhow::Result<()> {
    println!("session {} (type 'exit' to quit)", session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        match router.route(line, Some(session)).await {
            Ok(response) => println!("{}", response.text),
            Err(e) if e.is_rejection() => println!("Sorry, I couldn't understand that: {}", e),
            Err(e) => {
                router.end_session(session).await;
                return Err(e.into());
            }
        }
    }
    router.end_session(session).await;
    Ok(())
}
