//! Feedback client (fbk-ui) - Main entry point
//!
//! Terminal front end for the reconciliation core: list the feedback view,
//! submit a record and follow it through enrichment, or watch the view live.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fbk_common::config::{ClientConfig, ConfigResolver};
use fbk_common::UserId;
use fbk_ui::remote::{InMemoryRemoteStore, RemoteStore, RestRemoteStore, SimulatedPipeline};
use fbk_ui::view::{self, RecordCard};
use fbk_ui::{Dashboard, DashboardSettings, Draft, Session, StaticSession, SubmitOutcome};
use tokio::signal;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Enrichment delay of the demo pipeline
const DEMO_ENRICHMENT_DELAY: Duration = Duration::from_millis(300);

/// Command-line arguments for fbk-ui
#[derive(Parser, Debug)]
#[command(name = "fbk-ui")]
#[command(about = "Live feedback dashboard client")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-process backend with a simulated enrichment pipeline
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current feedback list, newest first
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit a feedback record and wait for it to be processed
    Submit {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: String,
    },
    /// Print the list every time it changes, until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = resolve_config(args.config.clone(), std::io::stderr)?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting fbk-ui v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let (remote, session, pipeline) = connect(&config, args.demo).await?;
    let dashboard = Dashboard::open(remote, session, DashboardSettings::from_config(&config))
        .await
        .context("Failed to open dashboard")?;

    let result = match args.command {
        Command::List { json } => print_list(&dashboard, json),
        Command::Submit { title, description } => submit(&dashboard, title, description).await,
        Command::Watch => watch(&dashboard).await,
    };

    dashboard.close().await;
    if let Some(pipeline) = pipeline {
        pipeline.stop();
    }
    result
}

/// Resolve the config under a bootstrap subscriber
///
/// The configured log level is not known yet, so the resolver's messages go
/// through an `info` default (or `RUST_LOG`) subscriber scoped to this call.
fn resolve_config<W>(cli_path: Option<PathBuf>, writer: W) -> Result<ClientConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(writer)
        .finish();

    tracing::subscriber::with_default(bootstrap, || {
        ConfigResolver::new().with_cli_path(cli_path).resolve()
    })
    .context("Failed to load configuration")
}

async fn connect(
    config: &ClientConfig,
    demo: bool,
) -> Result<(Arc<dyn RemoteStore>, Arc<dyn Session>, Option<SimulatedPipeline>)> {
    if demo {
        let store = Arc::new(InMemoryRemoteStore::new(
            config.invalidation.channel_capacity.max(1),
        ));
        let pipeline = SimulatedPipeline::spawn(Arc::clone(&store), DEMO_ENRICHMENT_DELAY);
        let user = config
            .session
            .user_id
            .unwrap_or_else(|| UserId(Uuid::new_v4()));
        info!(user_id = %user, "Demo mode: in-memory backend");
        let remote: Arc<dyn RemoteStore> = store;
        let session: Arc<dyn Session> = Arc::new(StaticSession::signed_in(user));
        return Ok((remote, session, Some(pipeline)));
    }

    let remote = RestRemoteStore::new(&config.backend).context("Failed to create backend client")?;
    let remote: Arc<dyn RemoteStore> = Arc::new(remote);
    let session: Arc<dyn Session> = Arc::new(StaticSession::from_config(&config.session));
    Ok((remote, session, None))
}

fn print_list(dashboard: &Dashboard, json: bool) -> Result<()> {
    let cards = view::cards(&dashboard.snapshot());
    if json {
        println!("{}", serde_json::to_string_pretty(&cards)?);
    } else if cards.is_empty() {
        println!("No feedback yet.");
    } else {
        for card in &cards {
            println!("{}", card.render_line());
        }
    }
    Ok(())
}

async fn submit(dashboard: &Dashboard, title: String, description: String) -> Result<()> {
    let mut draft = Draft::new(title, description);
    let outcome = dashboard.submit(&mut draft).await?;

    match outcome {
        SubmitOutcome::Enriched(record) => {
            println!("{}", RecordCard::from(&record).render_line());
        }
        SubmitOutcome::ResyncFallback { record_id } => {
            println!("Submitted {}; still processing, the list will update when done.", record_id);
        }
        SubmitOutcome::InsertFailed => {
            println!("Submission could not be saved. Please try again.");
        }
    }
    Ok(())
}

async fn watch(dashboard: &Dashboard) -> Result<()> {
    let mut snapshots = dashboard.watch_snapshots();
    print_list(dashboard, false)?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print_list(dashboard, false)?;
            }
        }
    }
    Ok(())
}
