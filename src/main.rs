//! Trawl - data layer of the trawl scraping platform
//!
//! - `trawl serve`: the resource API (runs, feedback, account settings)
//! - `trawl watch`: an interactive cache client that seeds from the API,
//!   subscribes to keys and prints every change as a JSON line

mod api;
mod cache;
mod client;
mod config;
mod error;
mod metrics;
mod services;
mod utils;

use crate::api::{router, AppState};
use crate::cache::{CacheController, CacheKey, EntryView, ResourceKind, Subscription};
use crate::client::{prefetch_seeds, ApiClient, MutationActions, MutationOutcome};
use crate::config::Config;
use crate::error::TrawlError;
use crate::metrics::create_metrics;
use crate::services::model::{NewFeedback, Run};
use crate::services::{Store, TokenSessions};
use crate::utils::ascii::print_startup_banner;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Trawl - scraping platform API and cache client
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(author, version, about = "Trawl API server and cache client", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable debug logging for API requests
    #[arg(long, global = true)]
    debug_requests: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the resource API
    Serve {
        /// Server port (overrides PORT env var)
        #[arg(short, long)]
        port: Option<u16>,

        /// Load demo records for every configured session user
        #[arg(long)]
        demo: bool,
    },
    /// Seed the cache from the API and watch keys interactively
    Watch {
        /// API base url (overrides TRAWL_API_URL)
        #[arg(long)]
        api_url: Option<String>,

        /// Paths to seed and subscribe, e.g. /api/runs?status=failed
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before parsing args, so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs, args.debug_requests)?;

    let mut config = Config::from_env()?;
    config.debug_requests = args.debug_requests;

    if args.debug_requests {
        info!("Request debugging enabled");
    }

    match args.command {
        Command::Serve { port, demo } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.demo_data |= demo;
            serve(config).await
        }
        Command::Watch { api_url, keys } => {
            if let Some(api_url) = api_url {
                config.client.api_url = api_url;
            }
            watch_keys(config, keys).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    print_startup_banner();
    info!("Starting trawl v{}", env!("CARGO_PKG_VERSION"));

    let metrics = create_metrics()?;

    let sessions = TokenSessions::parse(&config.server.session_tokens)?;
    if sessions.is_empty() {
        warn!("TRAWL_SESSION_TOKENS is empty, every resource route will answer 401");
    }

    let store = if config.server.demo_data {
        Store::with_demo_data(&sessions.user_ids())
    } else {
        Store::new()
    };

    let state = AppState::new(store, Arc::new(sessions), metrics);

    let app = router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(
        "Listening on http://{} (API: /api, Metrics: /metrics, Health: /health)",
        addr
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
        info!("Shutdown signal received, initiating graceful shutdown...");
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Trawl shutdown complete");
    Ok(())
}

const WATCH_HELP: &str = "commands: show | runs | open <path> | invalidate <path> | focus | reconnect | \
delete-run <id> | feedback <bug|feature|other> <message> | delete-my-data | logout | quit";

async fn watch_keys(config: Config, keys: Vec<String>) -> anyhow::Result<()> {
    let metrics = create_metrics()?;
    let api = ApiClient::new(
        &config.client.api_url,
        config.client.session_token.clone(),
        config.request_timeout(),
    )?;
    let cache = CacheController::new(
        Arc::new(api.clone()),
        config.to_controller_config(),
        metrics,
    );
    let actions = MutationActions::new(api.clone(), cache.clone());

    let keys: Vec<CacheKey> = if keys.is_empty() {
        vec![
            CacheKey::collection(ResourceKind::Runs),
            CacheKey::collection(ResourceKind::Feedback),
            CacheKey::collection(ResourceKind::Profile),
        ]
    } else {
        keys.into_iter().map(CacheKey::from_path).collect()
    };

    info!(api_url = %api.base_url(), keys = keys.len(), "Starting cache watch");

    // Seed, mount, then commit: nothing refetches before the first commit
    let seeds = prefetch_seeds(&api, keys.clone()).await;
    cache.seed_many(seeds).await;
    for key in keys {
        spawn_printer(cache.subscribe(key).await);
    }
    cache.mark_first_commit();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_handle = cache.spawn_refresh_loop(shutdown_rx);

    eprintln!("{}", WATCH_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match run_command(&cache, &actions, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => print_line(json!({ "error": e.to_string() })),
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresh_handle {
        let _ = handle.await;
    }
    cache.clear().await;

    info!("Cache watch stopped");
    Ok(())
}

/// Run one REPL command. Returns `Ok(false)` to quit.
async fn run_command(
    cache: &CacheController,
    actions: &MutationActions,
    line: &str,
) -> Result<bool, TrawlError> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "help" => eprintln!("{}", WATCH_HELP),
        "show" => {
            for key in cache.keys().await {
                if let Some(view) = cache.read(&key).await {
                    print_view(&key, &view);
                }
            }
        }
        "runs" => {
            let key = CacheKey::collection(ResourceKind::Runs);
            let view = cache
                .read(&key)
                .await
                .ok_or_else(|| TrawlError::NotFound(format!("{} is not cached", key)))?;
            for line in run_summaries(&view)? {
                print_line(line);
            }
        }
        "open" if !rest.is_empty() => spawn_printer(cache.subscribe(CacheKey::from_path(rest)).await),
        "invalidate" if !rest.is_empty() => {
            let started = cache.invalidate(&CacheKey::from_path(rest)).await.is_some();
            print_line(json!({ "invalidate": rest, "started": started }));
        }
        "focus" => print_line(json!({ "focus": cache.on_focus().await })),
        "reconnect" => print_line(json!({ "reconnect": cache.on_reconnect().await })),
        "delete-run" if !rest.is_empty() => report(actions.delete_run(rest).await?).await,
        "feedback" => {
            let (kind, message) = rest.split_once(' ').unwrap_or((rest, ""));
            let feedback = NewFeedback {
                kind: serde_json::from_value(json!(kind))?,
                message: message.to_string(),
            };
            report(actions.submit_feedback(&feedback).await?).await;
        }
        "delete-my-data" => report(actions.delete_my_data().await?).await,
        "logout" => print_line(json!({ "cleared": cache.clear().await })),
        other => eprintln!("unknown command '{}'; {}", other, WATCH_HELP),
    }

    Ok(true)
}

async fn report(outcome: MutationOutcome) {
    let value = outcome.wait_refreshed().await;
    print_line(json!({ "written": value }));
}

fn spawn_printer(mut subscription: Subscription) {
    tokio::spawn(async move {
        let key = subscription.key().clone();
        print_view(&key, &subscription.current());
        while let Some(view) = subscription.changed().await {
            print_view(&key, &view);
        }
    });
}

fn print_view(key: &CacheKey, view: &EntryView) {
    print_line(json!({
        "key": key.as_str(),
        "state": view.state.as_str(),
        "value": view.value,
        "error": view.error.as_ref().map(ToString::to_string),
        "status": view.error.as_ref().and_then(TrawlError::status),
    }));
}

/// One line per cached run, decoded into the typed record.
fn run_summaries(view: &EntryView) -> Result<Vec<serde_json::Value>, TrawlError> {
    let runs: Vec<Run> = view.decode().transpose()?.unwrap_or_default();
    Ok(runs
        .into_iter()
        .map(|run| {
            json!({
                "id": run.id,
                "name": run.name,
                "status": run.status,
                "items_scraped": run.items_scraped,
            })
        })
        .collect())
}

fn print_line(value: serde_json::Value) {
    println!("{}", value);
}

fn init_logging(level: &str, json: bool, debug_requests: bool) -> anyhow::Result<()> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);

    // Build filter: set trawl to requested level, and optionally enable request debugging
    let filter = if debug_requests {
        EnvFilter::new(format!(
            "trawl={},trawl::client::api=debug,trawl::api=debug,tower_http=debug,hyper=warn",
            level
        ))
    } else {
        EnvFilter::new(format!("trawl={},tower_http=info,hyper=warn", level))
    };

    // stdout carries the watch output, logs go to stderr
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::ScriptedFetcher;
    use crate::cache::{ControllerConfig, ListFilter};
    use crate::metrics::create_metrics;
    use crate::services::RunQuery;

    #[tokio::test]
    async fn test_run_summaries_decode_cached_runs() {
        let store = Store::with_demo_data(&["alice".to_string()]);
        let runs = store.list_runs("alice", &RunQuery::default()).runs;

        let cache = CacheController::new(
            Arc::new(ScriptedFetcher::new()),
            ControllerConfig::default(),
            create_metrics().unwrap(),
        );
        let key = CacheKey::collection(ResourceKind::Runs);
        cache.seed(key.clone(), serde_json::to_value(&runs).unwrap()).await;

        let view = cache.read(&key).await.unwrap();
        let lines = run_summaries(&view).unwrap();
        assert_eq!(lines.len(), runs.len());
        assert_eq!(lines[0]["id"], json!(runs[0].id));
        assert_eq!(lines[0]["items_scraped"], json!(runs[0].items_scraped));

        let broken = CacheKey::filtered(ResourceKind::Runs, &ListFilter::new().status("failed"));
        cache.seed(broken.clone(), json!([{"id": "broken"}])).await;
        let view = cache.read(&broken).await.unwrap();
        assert!(matches!(run_summaries(&view), Err(TrawlError::Parse(_))));
    }
}
