use std::path::Path;
use std::sync::Arc;

use stay_assist::agent::{Agent, Assistant};
use stay_assist::booking::{BookingFlowEngine, ConversationStateStore, KeywordClassifier};
use stay_assist::channels::{ChannelManager, CliChannel, TelegramChannel, api_routes};
use stay_assist::clock::{Clock, SystemClock};
use stay_assist::config::{AssistConfig, SearchConfig, TelegramConfig};
use stay_assist::llm::{LlmConfig, LlmProvider, OfflineProvider, Responder, create_provider};
use stay_assist::memory::ContextWindowManager;
use stay_assist::search::HttpHotelSearch;
use stay_assist::store::{Database, LibSqlBackend};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Stderr logging, plus a daily rolling file when `log_dir` is set. The
/// returned guard must live as long as the process.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "stay-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AssistConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🏨 {} v{}", config.name, env!("CARGO_PKG_VERSION"));

    // ── Storage ───────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    // ── LLM ───────────────────────────────────────────────────────────────
    let llm_config = LlmConfig::from_env()?;
    let llm: Arc<dyn LlmProvider> = match &llm_config {
        Some(llm_config) => create_provider(llm_config)?,
        None => {
            tracing::warn!("ASSIST_LLM_API_KEY not set, general replies will be offline echoes");
            Arc::new(OfflineProvider)
        }
    };
    let mut responder = Responder::new(Arc::clone(&llm), &config);
    if let Some(llm_config) = &llm_config {
        responder = responder.with_sampling(llm_config.max_tokens, llm_config.temperature);
    }

    // ── Booking flow ──────────────────────────────────────────────────────
    let search_config = SearchConfig::from_env()?;
    let search = Arc::new(HttpHotelSearch::new(&search_config)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let states = Arc::new(ConversationStateStore::with_clock(
        config.state_ttl,
        Arc::clone(&clock),
    ));
    let flow = BookingFlowEngine::new(
        states,
        Arc::new(KeywordClassifier::default_rules()),
        search,
        clock,
        config.booking.clone(),
    );

    let memory = ContextWindowManager::new(Arc::clone(&db), config.history_limit);
    let assistant = Arc::new(Assistant::new(flow, memory, responder, db));

    // ── HTTP API ──────────────────────────────────────────────────────────
    let app = api_routes(Arc::clone(&assistant));
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{api_port}")).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(port = api_port, "Failed to bind chat API port: {e}");
                return;
            }
        };
        tracing::info!(port = api_port, "Chat API server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Chat API server stopped: {e}");
        }
    });

    eprintln!("   Model: {}", llm.model_name());
    eprintln!("   Search: {}", search_config.base_url);
    eprintln!("   Chat API: http://0.0.0.0:{api_port}/api/chat/send");

    // ── Channels ──────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();

    if config.cli_enabled {
        channels.add(Box::new(CliChannel::new()));
    }

    if let Some(telegram) = TelegramConfig::from_env() {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::from_config(&telegram)));
    }

    let active = channels.names().join(", ");
    eprintln!(
        "   Channels: {}\n",
        if active.is_empty() { "api only" } else { active.as_str() }
    );

    if channels.names().is_empty() {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Ctrl+C received, shutting down...");
    } else {
        let agent = Agent::new(&config.name, assistant, channels, config.rate_limit);
        agent.run().await?;
    }

    api_handle.abort();
    Ok(())
}
