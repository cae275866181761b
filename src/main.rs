use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use greytown::events::{filter, EventReader, Significance};
use greytown::mail::{BdLedger, Message, Priority, Router};
use greytown::patrol::{Patrol, SessionTaskRunner};
use greytown::session::{SessionManager, SessionSpec, TmuxController};
use greytown::types::address::{session_id_for, Address};
use greytown::watch::{self, RestartWatch};
use greytown::TownConfig;

#[derive(Parser)]
#[command(name = "gt")]
#[command(about = "Fleet supervisor for ephemeral agent sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run patrol cycles: evaluate gates and dispatch open tasks.
    Patrol {
        /// Keep running cycles at a fixed cadence instead of one cycle.
        #[arg(long)]
        r#loop: bool,
        /// Seconds between cycles in loop mode.
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Start an agent session at the given address.
    Start { address: String },
    /// Stop the agent session at the given address.
    Stop { address: String },
    /// Restart the agent session at the given address.
    Restart { address: String },
    /// Show the reconciled status of an agent session.
    Status { address: String },
    /// Send a message through the work ledger.
    Mail {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Narrate the activity stream.
    Events {
        /// Only events touching this workspace.
        #[arg(long)]
        workspace: Option<String>,
        /// Minimum significance: low, medium, or high.
        #[arg(long)]
        min: Option<String>,
        /// Only show the last N events.
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Run the restart-watch loop.
    Watch,
    /// Request a restart on the next watch poll.
    RequestRestart { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = TownConfig::from_env();

    match cli.command {
        Commands::Patrol { r#loop, interval } => run_patrol(config, r#loop, interval).await,
        Commands::Start { address } => {
            let report = manager(&config).start(&spec_for(&config, &address)?)?;
            println!("started {} ({})", report.session.id, report.session.role);
            if report.replaced_zombie {
                println!("replaced a zombie container");
            }
            for aux in report.aux.iter().filter(|a| !a.ok) {
                println!("warning: {} failed", aux.label);
            }
            Ok(())
        }
        Commands::Stop { address } => {
            let id = resolve(&address)?;
            manager(&config).stop(&id)?;
            println!("stopped {id}");
            Ok(())
        }
        Commands::Restart { address } => {
            let report = manager(&config).restart(&spec_for(&config, &address)?)?;
            println!("restarted {}", report.session.id);
            Ok(())
        }
        Commands::Status { address } => {
            let id = resolve(&address)?;
            let status = manager(&config).status(&id)?;
            println!("{id}: {:?}", status.session.state);
            println!("  container present: {}", status.container_present);
            println!("  worker alive:      {}", status.worker_alive);
            Ok(())
        }
        Commands::Mail {
            from,
            to,
            subject,
            body,
            priority,
        } => {
            let mut msg = Message::new(from, to, subject);
            msg.body = body;
            msg.priority = parse_priority(&priority)?;
            let router = Router::new(
                Arc::new(BdLedger::new(&config.town_root)),
                Arc::new(TmuxController::new()),
            );
            router.send(&msg)?;
            println!("delivered to {}", msg.to);
            Ok(())
        }
        Commands::Events {
            workspace,
            min,
            tail,
        } => run_events(&config, workspace, min, tail),
        Commands::Watch => {
            let manager = Arc::new(manager(&config));
            let watched = watched_specs(&config)?;
            RestartWatch::new(&config, manager, watched).run()
        }
        Commands::RequestRestart { address } => {
            resolve(&address)?;
            watch::request_restart(&config.daemon_dir())?;
            println!("restart requested");
            Ok(())
        }
    }
}

async fn run_patrol(config: TownConfig, looped: bool, interval: u64) -> Result<()> {
    let controller = Arc::new(TmuxController::new());
    let manager = Arc::new(SessionManager::new(config.clone(), controller.clone()));
    let runner = Arc::new(SessionTaskRunner::new(
        config.clone(),
        manager,
        controller,
    ));
    let ledger = Arc::new(BdLedger::new(&config.town_root));
    let mut patrol = Patrol::new(config.clone(), runner, Some(ledger));

    watch::touch_activity(&config.daemon_dir(), "patrol");
    if looped {
        patrol
            .run_loop(std::time::Duration::from_secs(interval))
            .await
    } else {
        let report = patrol.run_cycle().await?;
        println!(
            "{} succeeded, {} failed, {} skipped",
            report.succeeded,
            report.failed,
            report.skipped.len()
        );
        for (id, reason) in &report.skipped {
            println!("  skipped {id}: {reason}");
        }
        Ok(())
    }
}

fn run_events(
    config: &TownConfig,
    workspace: Option<String>,
    min: Option<String>,
    tail: Option<usize>,
) -> Result<()> {
    let reader = EventReader::new(config.events_path());
    let mut events = reader.read_all()?;

    if let Some(ws) = workspace {
        events = filter::by_workspace(&events, &ws);
    }
    if let Some(min) = min {
        events = filter::by_min_significance(&events, parse_significance(&min)?);
    }
    if let Some(n) = tail {
        let skip = events.len().saturating_sub(n);
        events.drain(..skip);
    }

    for e in &events {
        println!("{}  {}", e.event.timestamp, e.summary);
    }
    Ok(())
}

fn manager(config: &TownConfig) -> SessionManager {
    SessionManager::new(config.clone(), Arc::new(TmuxController::new()))
}

fn resolve(address: &str) -> Result<String> {
    session_id_for(address).ok_or_else(|| anyhow!("unroutable address {address:?}"))
}

fn spec_for(config: &TownConfig, address: &str) -> Result<SessionSpec> {
    let id = resolve(address)?;
    let role = Address::parse(address)
        .map(|a| a.role().to_string())
        .unwrap_or_else(|| "worker".to_string());
    Ok(SessionSpec {
        id,
        role: role.clone(),
        dir: config.town_root.join(address.trim_end_matches('/')),
        command: config.agent_command.clone(),
        env: vec![
            ("GT_ROLE".to_string(), role),
            (
                "GT_TOWN_ROOT".to_string(),
                config.town_root.display().to_string(),
            ),
        ],
    })
}

/// Sessions the watch loop is responsible for reviving.
fn watched_specs(config: &TownConfig) -> Result<Vec<SessionSpec>> {
    Ok(vec![
        spec_for(config, "mayor")?,
        spec_for(config, "deacon")?,
    ])
}

fn parse_priority(s: &str) -> Result<Priority> {
    match s {
        "urgent" => Ok(Priority::Urgent),
        "high" => Ok(Priority::High),
        "normal" => Ok(Priority::Normal),
        "low" => Ok(Priority::Low),
        other => Err(anyhow!("unknown priority {other:?}")),
    }
}

fn parse_significance(s: &str) -> Result<Significance> {
    match s {
        "low" => Ok(Significance::Low),
        "medium" => Ok(Significance::Medium),
        "high" => Ok(Significance::High),
        other => Err(anyhow!("unknown significance {other:?}")),
    }
}
