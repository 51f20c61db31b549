use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triage_core::config::AppConfig;
use triage_core::event::{EventBus, WorkflowEvent};
use triage_engine::{Collaborators, WorkflowEngine, WorkflowRun};

#[derive(Parser)]
#[command(name = "triage", version, about = "Automated incident triage workflow")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage a single alert and exit
    Run {
        /// Alert text (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        alert: Vec<String>,
        /// Print workflow events as they happen
        #[arg(long)]
        events: bool,
        /// Print the full run as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Run the sample incident scenarios
    Demo {
        /// Run every scenario without prompting
        #[arg(long)]
        all: bool,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// (name, alert, expectation)
const SCENARIOS: &[(&str, &str, &str)] = &[
    (
        "Database Timeout",
        "Payment API experiencing database connection timeouts and high error rates",
        "high confidence, should auto-resolve",
    ),
    (
        "Memory Leak",
        "Auth Service showing memory leak patterns and degraded performance",
        "medium confidence, may escalate",
    ),
    (
        "Network Issues",
        "Load balancer reporting uneven traffic distribution and connection failures",
        "complex, likely escalation",
    ),
    (
        "Unknown Service",
        "Critical system failure in unknown microservice with no clear symptoms",
        "service cannot be identified",
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "triage", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(&config.log.level))),
        )
        .with_target(false)
        .init();

    if cli.config.exists() {
        info!(path = %cli.config.display(), "Loaded config");
    } else {
        warn!(path = %cli.config.display(), "No config file found, using defaults");
    }

    config.validate()?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Run {
            alert,
            events,
            json,
        }) => {
            let mut text = alert.join(" ");
            if text.trim().is_empty() {
                let stdin = io::stdin();
                text = stdin
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if text.trim().is_empty() {
                anyhow::bail!("no alert text given");
            }
            let run = triage(&config, &text, events).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_summary(&run);
            }
        }
        Some(Commands::Demo { all }) => run_demo(&config, all).await?,
        None => run_demo(&config, false).await?,
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        Ok(AppConfig::load(path)?)
    } else {
        Ok(AppConfig::default())
    }
}

/// Apply the configured level to our own crates and keep dependencies quiet.
fn log_filter(level: &str) -> String {
    format!(
        "triage={0},triage_core={0},triage_agents={0},triage_engine={0},warn",
        level
    )
}

async fn triage(config: &AppConfig, alert: &str, show_events: bool) -> anyhow::Result<WorkflowRun> {
    let mut engine = WorkflowEngine::new(Collaborators::from_config(config), config.workflow.clone())?;

    let printer = if show_events {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        engine = engine.with_event_bus(bus);
        Some(tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                let done = matches!(event, WorkflowEvent::RunFinished { .. });
                print_event(&event);
                if done {
                    break;
                }
            }
        }))
    } else {
        None
    };

    let run = engine.run(alert).await;
    if let Some(handle) = printer {
        handle.await.ok();
    }
    Ok(run)
}

/// One JSON line per event.
fn print_event(event: &WorkflowEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "Failed to encode workflow event"),
    }
}

fn print_summary(run: &WorkflowRun) {
    let state = &run.state;
    println!();
    println!("Incident:  {}", run.incident_id());
    println!("Service:   {}", state.service_name());
    println!("Severity:  {}", state.severity_or_default());
    println!("Outcome:   {}", run.outcome);
    println!(
        "Phases:    {}",
        run.phases
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    if let Some(ref summary) = state.coordination_summary {
        println!(
            "Analysis:  {} anomalies, {} similar incidents, confidence {:.2}",
            summary.total_anomalies, summary.similar_incidents_count, summary.ai_confidence
        );
    }
    if let Some(ref mitigation) = state.mitigation_results {
        println!("Actions:");
        for action in &mitigation.actions_taken {
            println!("  - {}", action);
        }
    }
    if let Some(ref escalation) = state.escalation_results {
        println!(
            "Escalated: {} ({} priority)",
            escalation.assigned_to, escalation.priority
        );
    }
    if !state.errors.is_empty() {
        println!("Faults:");
        for fault in &state.errors {
            let kind = if fault.recoverable { "recovered" } else { "fatal" };
            println!("  - [{}] {}: {}", kind, fault.stage, fault.message);
        }
    }
    println!("Elapsed:   {}ms", run.total_elapsed_ms);
}

async fn run_demo(config: &AppConfig, all: bool) -> anyhow::Result<()> {
    if all {
        for (name, alert, _) in SCENARIOS {
            println!("\n== {} ==", name);
            println!("Alert: {}", alert);
            let run = triage(config, alert, false).await?;
            print_summary(&run);
        }
        return Ok(());
    }

    let mut items: Vec<String> = SCENARIOS
        .iter()
        .map(|(name, _, expectation)| format!("{} ({})", name, expectation))
        .collect();
    items.push("Custom alert".to_string());
    items.push("Exit".to_string());

    loop {
        let choice = dialoguer::Select::new()
            .with_prompt("Select a scenario")
            .items(&items)
            .default(0)
            .interact()?;

        let alert = match choice {
            i if i < SCENARIOS.len() => SCENARIOS[i].1.to_string(),
            i if i == SCENARIOS.len() => {
                let text: String = dialoguer::Input::new()
                    .with_prompt("Alert text")
                    .interact_text()?;
                if text.trim().is_empty() {
                    println!("No alert given");
                    continue;
                }
                text
            }
            _ => break,
        };

        println!("Alert: {}", alert);
        let run = triage(config, &alert, false).await?;
        print_summary(&run);
    }
    Ok(())
}
