use clap::Parser;
use feed_posts::fetcher::build_http_client;
use feed_posts::input::read_feed_identifiers;
use feed_posts::{
    Cli, Credentials, Dispatcher, FeedPipeline, FeedStore, MemoryFeedStore, PgFeedStore, RunSummary,
    XrpcFeedClient, XrpcSession,
};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    info!("Starting feed-posts");

    let config = cli.ingest_config();
    config.validate()?;
    let client_config = cli.client_config();
    client_config.validate()?;

    let input = cli.resolve_input()?;
    let identifiers = read_feed_identifiers(&input)?;
    info!("Loaded {} feed identifiers from {}", identifiers.len(), input.display());

    let pg_store = if cli.dry_run {
        warn!("Dry run: state is kept in memory and discarded on exit");
        None
    } else {
        let store_config = cli.store_config();
        let store = PgFeedStore::connect(&store_config).await.map_err(|e| {
            error!("Failed to connect to database. Make sure PostgreSQL is running:");
            error!("  Check connection string: {}", store_config.redacted_url());
            e
        })?;
        store.setup_schema().await?;
        Some(Arc::new(store))
    };
    let store: Arc<dyn FeedStore> = match &pg_store {
        Some(store) => store.clone() as Arc<dyn FeedStore>,
        None => Arc::new(MemoryFeedStore::new()) as Arc<dyn FeedStore>,
    };

    let credentials = Credentials::load(&cli.credentials)?;
    let http = build_http_client(&client_config)?;
    let session = Arc::new(XrpcSession::create(http.clone(), &client_config, &credentials).await?);

    let cancel = CancellationToken::new();
    let refresher = session
        .clone()
        .spawn_refresh_task(client_config.refresh_interval(), cancel.child_token());

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping dispatch");
            interrupt.cancel();
        }
    });

    let source = Arc::new(XrpcFeedClient::new(http, &client_config, session));
    let pipeline = FeedPipeline::new(source, store, &config);
    let dispatcher = Dispatcher::new(pipeline, config, cancel.clone());

    let summary = dispatcher.run(identifiers).await;

    cancel.cancel();
    if let Err(e) = refresher.await {
        warn!("Session refresh task ended abnormally: {}", e);
    }

    log_summary(&summary);

    if let Some(store) = pg_store {
        match (store.count_feeds().await, store.count_posts().await) {
            (Ok(feeds), Ok(posts)) => info!("Database holds {} feeds and {} posts", feeds, posts),
            (Err(e), _) | (_, Err(e)) => error!("Failed to get stats: {}", e),
        }
    }

    info!("All feeds processed");
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::io::stdout.and(Mutex::new(file)))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    Ok(())
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Run finished: {} dispatched, {} succeeded, {} failed, {} pages, {} new posts{}",
        summary.dispatched,
        summary.succeeded,
        summary.failed,
        summary.pages,
        summary.new_items,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    for (kind, count) in &summary.errors_by_kind {
        info!("  {} errors: {}", kind, count);
    }
    if summary.panicked > 0 {
        error!("  {} feeds panicked during processing", summary.panicked);
    }
    if summary.lost_workers > 0 {
        error!("  {} workers ended early, their reports are missing", summary.lost_workers);
    }
    for identifier in &summary.failed_feeds {
        info!("  failed: {}", identifier);
    }
}
