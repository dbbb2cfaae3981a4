use std::sync::Arc;

use {
    anyhow::Context,
    clap::Parser,
    secrecy::Secret,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    batchlink_store::{SqliteBundleStore, SqliteChannelStore, SqliteSessionStore},
    batchlink_telegram::BotConfig,
};

#[derive(Parser)]
#[command(
    name = "batchlink",
    about = "batchlink — share batches of channel videos behind a single link"
)]
struct Cli {
    /// Bot token from @BotFather.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Path to the SQLite database.
    #[arg(long, env = "BATCHLINK_DB", default_value = "batchlink.db")]
    db: std::path::PathBuf,

    /// Pause between video dispatches during delivery, in seconds.
    #[arg(long, default_value_t = 3)]
    video_pause_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap resolves env-backed arguments.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    let db_url = format!("sqlite:{}?mode=rwc", cli.db.display());
    let pool = sqlx::SqlitePool::connect(&db_url)
        .await
        .with_context(|| format!("failed to open {}", cli.db.display()))?;

    SqliteSessionStore::init(&pool)
        .await
        .context("failed to init sessions table")?;
    SqliteBundleStore::init(&pool)
        .await
        .context("failed to init bundles table")?;
    SqliteChannelStore::init(&pool)
        .await
        .context("failed to init channels table")?;

    let sessions = Arc::new(SqliteSessionStore::new(pool.clone()));
    let bundles = Arc::new(SqliteBundleStore::new(pool.clone()));
    let channels = Arc::new(SqliteChannelStore::new(pool));

    let config = BotConfig {
        token: Secret::new(cli.bot_token),
        video_pause_secs: cli.video_pause_secs,
    };

    let cancel = batchlink_telegram::start_polling(config, sessions, bundles, channels).await?;

    info!("batchlink running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}
