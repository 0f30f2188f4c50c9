//! Pricebell - Telegram crypto alert bot.
//!
//! Spawns the long-running processes (indicator poller, one alert process
//! per category) and runs the Telegram command dispatcher in the main task.

mod config;

use clap::Parser;
use config::{AppConfig, StoreBackend};
use pricebell_alerts::{AlertNotifier, EmailClient, EmailConfig, TelegramBot};
use pricebell_core::IndicatorCatalog;
use pricebell_engine::{
    AlertProcess, IndicatorPoller, Notifier, PollerConfig, ProcessConfig, SharedAggregate,
    SimpleStrategy, TechnicalStrategy,
};
use pricebell_feeds::{
    price::{BINANCE_GLOBAL_HOST, BINANCE_US_HOST},
    IndicatorClient, IndicatorClientConfig, PriceClient, PriceClientConfig, RateLimit,
};
use pricebell_store::{AlertStore, JsonStore, SqliteStore, StoreError, UserLocks};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Pricebell CLI
#[derive(Parser, Debug)]
#[command(name = "pricebell-bot")]
#[command(about = "Telegram crypto price & indicator alert bot", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Whitelist this Telegram user id as the first admin and exit setup
    #[arg(long)]
    init_admin: Option<String>,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn AlertStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Json => Ok(Arc::new(JsonStore::new(&config.store.data_dir))),
        StoreBackend::Sqlite => Ok(Arc::new(
            SqliteStore::connect(&config.store.database_url).await?,
        )),
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level);

    info!("pricebell starting...");

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = args.config, error = %e, "could not load configuration");
            return;
        }
    };

    let catalog = match IndicatorCatalog::builtin() {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!(error = %e, "could not load the indicator catalog");
            return;
        }
    };
    info!(indicators = catalog.len(), "indicator catalog loaded");

    let store = match build_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "could not open the alert store");
            return;
        }
    };

    if let Some(admin) = &args.init_admin {
        match store.whitelist_user(admin, true).await {
            Ok(()) => info!(user = admin, "seeded initial admin user"),
            Err(StoreError::AlreadyWhitelisted(_)) => {
                info!(user = admin, "admin user already whitelisted")
            }
            Err(e) => {
                error!(error = %e, "could not seed the initial admin user");
                return;
            }
        }
    }

    match store.whitelist().await {
        Ok(whitelist) if whitelist.is_empty() => {
            error!(
                "setup not complete: the whitelist is empty. \
                 Start once with --init-admin <your_telegram_id>"
            );
            return;
        }
        Ok(whitelist) => info!(users = whitelist.len(), "whitelist loaded"),
        Err(e) => {
            error!(error = %e, "could not read the whitelist");
            return;
        }
    }

    let Ok(telegram_token) = std::env::var("TELEGRAM_BOT_TOKEN") else {
        error!("missing environment variable: TELEGRAM_BOT_TOKEN");
        return;
    };

    let price_host = match config.price_feed.location.to_lowercase().as_str() {
        "us" => BINANCE_US_HOST,
        _ => BINANCE_GLOBAL_HOST,
    };
    let prices = match PriceClient::new(PriceClientConfig {
        base_url: price_host.to_string(),
        ..PriceClientConfig::default()
    }) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "could not build the price client");
            return;
        }
    };

    // Email is optional; with partial credentials the feature stays off.
    let email = match (
        std::env::var("SENDGRID_APIKEY").ok(),
        std::env::var("ALERTS_EMAIL").ok(),
    ) {
        (Some(api_key), Some(from)) => match EmailClient::new(EmailConfig { api_key, from }) {
            Ok(client) => Some(client),
            Err(e) => {
                error!(error = %e, "could not build the email client");
                return;
            }
        },
        (None, None) => None,
        _ => {
            warn!("email alerts disabled: set both SENDGRID_APIKEY and ALERTS_EMAIL");
            None
        }
    };
    let email_available = email.is_some();

    // Technical alerts run only when an indicator API key is configured;
    // the simple-price process is unaffected either way.
    let indicator_key = std::env::var("TAAPIIO_APIKEY").ok();
    let technical_enabled = indicator_key.is_some();

    let locks = Arc::new(UserLocks::new());
    let telegram = Arc::new(TelegramBot::new(
        &telegram_token,
        store.clone(),
        locks.clone(),
        catalog.clone(),
        prices.clone(),
        config.max_alerts_per_user,
        technical_enabled,
        email_available,
    ));
    let notifier: Arc<dyn Notifier> =
        Arc::new(AlertNotifier::new(telegram.bot(), store.clone(), email));

    // Simple-price alert process.
    let cex_process = AlertProcess::new(
        store.clone(),
        locks.clone(),
        notifier.clone(),
        SimpleStrategy::new(prices.clone()),
        ProcessConfig {
            poll_period: Duration::from_secs(config.polling.cex_period_secs),
            error_backoff: Duration::from_secs(config.polling.error_backoff_secs),
        },
    );
    tokio::spawn(async move {
        cex_process.run().await;
    });

    // Indicator poller + technical alert process.
    if let Some(api_key) = indicator_key {
        let aggregate = SharedAggregate::new(Some(PathBuf::from(
            &config.indicators.snapshot_path,
        )));
        if aggregate.restore().await {
            info!("restored aggregate snapshot");
        }

        let indicator_client = match IndicatorClient::new(IndicatorClientConfig {
            exchange: config.indicators.exchange.clone(),
            rate_limit: RateLimit::per_period_buffered(
                Duration::from_secs(config.indicators.period_secs),
                config.indicators.buffer_pct,
            ),
            ..IndicatorClientConfig::new(api_key)
        }) {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "could not build the indicator client");
                return;
            }
        };

        let poller = IndicatorPoller::new(
            store.clone(),
            catalog.clone(),
            indicator_client,
            aggregate.clone(),
            notifier.clone(),
            PollerConfig {
                error_backoff: Duration::from_secs(config.polling.error_backoff_secs),
                ..PollerConfig::default()
            },
        );
        tokio::spawn(async move {
            poller.run().await;
        });

        let technical_process = AlertProcess::new(
            store.clone(),
            locks.clone(),
            notifier.clone(),
            TechnicalStrategy::new(aggregate, catalog.clone()),
            ProcessConfig {
                poll_period: Duration::from_secs(config.polling.technical_period_secs),
                error_backoff: Duration::from_secs(config.polling.error_backoff_secs),
            },
        );
        tokio::spawn(async move {
            technical_process.run().await;
        });
    } else {
        warn!("technical alerts disabled: set TAAPIIO_APIKEY to enable them");
    }

    // Telegram command dispatcher owns the main task; it exits on Ctrl+C and
    // the spawned loops die with the process.
    info!("pricebell running, press Ctrl+C to stop");
    telegram.run().await;

    info!("pricebell stopped");
}
