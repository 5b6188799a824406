use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analysis_cache::AnalysisCache;
use db_pool::{create_pool, migrate, DbConfig};
use transactional_outbox::{
    BackoffConfig, BackoffStrategy, KafkaOutboxPublisher, OutboxProcessor, ProcessorConfig,
    SqlxOutboxRepository,
};

use web_analyzer_service::analysis::fetcher::HttpFetcher;
use web_analyzer_service::analysis::html_analyzer::RegexHtmlAnalyzer;
use web_analyzer_service::analysis::link_checker::HttpLinkChecker;
use web_analyzer_service::broker::KafkaConsumer;
use web_analyzer_service::db::SqlxAnalysisRepository;
use web_analyzer_service::handlers::{self, AppState};
use web_analyzer_service::services::{AnalysisWorker, EventStreamService, SubmissionService};
use web_analyzer_service::Config;

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("configuration loading failed: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("starting web-analyzer-service v{}", env!("CARGO_PKG_VERSION"));

    let mut db_cfg =
        DbConfig::from_env("web-analyzer-service").unwrap_or_else(|_| DbConfig::default());
    db_cfg.service_name = "web-analyzer-service".to_string();
    db_cfg.database_url = config.database.url.clone();
    db_cfg.max_connections = config.database.max_connections;
    let db_pool = create_pool(db_cfg.clone())
        .await
        .unwrap_or_else(|e| panic!("failed to create database pool: {e}"));
    if let Err(e) = migrate(&db_pool).await {
        tracing::error!("database migration failed: {e}");
        std::process::exit(1);
    }

    let redis = analysis_cache::connect(&config.cache.url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to redis: {e}"));
    let analysis_cache: Arc<AnalysisCache<web_analyzer_service::models::Analysis>> =
        Arc::new(AnalysisCache::new(redis));

    let analysis_repo = Arc::new(SqlxAnalysisRepository::new(db_pool.clone()));
    let outbox_repo = Arc::new(SqlxOutboxRepository::new(db_pool.clone()));

    let submission = Arc::new(SubmissionService::new(
        db_pool.clone(),
        analysis_repo.clone(),
        outbox_repo.clone(),
        analysis_cache.clone(),
        config.outbox.max_retries_by_priority.clone(),
    ));

    let event_stream = Arc::new(EventStreamService::new(
        analysis_repo.clone(),
        analysis_cache.clone(),
        Duration::from_millis(config.sse.heartbeat_interval_ms),
        Duration::from_millis(config.sse.events_interval_ms),
    ));

    let publisher = Arc::new(
        KafkaOutboxPublisher::new(&config.kafka.brokers, config.kafka.topic_prefix.clone())
            .unwrap_or_else(|e| panic!("failed to construct kafka publisher: {e}")),
    );
    let backoff = Arc::new(BackoffStrategy::new(
        BackoffConfig {
            base_delay: Duration::from_millis(config.backoff.base_delay_ms),
            max_delay: Duration::from_millis(config.backoff.max_delay_ms),
            multiplier: config.backoff.multiplier,
            jitter: config.backoff.jitter,
        },
        StdRng::from_entropy(),
    ));
    let processor = Arc::new(OutboxProcessor::new(
        outbox_repo.clone(),
        publisher,
        backoff,
        ProcessorConfig {
            tick_interval: Duration::from_millis(config.outbox.processor_interval_ms),
            batch_size: config.outbox.batch_size,
        },
    ));
    let _processor_handle = processor.spawn();

    let worker = Arc::new(AnalysisWorker::new(
        analysis_repo.clone(),
        outbox_repo.clone(),
        analysis_cache.clone(),
        Arc::new(HttpFetcher::default()),
        Arc::new(RegexHtmlAnalyzer),
        Arc::new(HttpLinkChecker::new(Duration::from_secs(5))),
    ));

    let consumer_topic = format!("{}.analysis", config.kafka.topic_prefix);
    let worker_for_consumer = worker.clone();
    match KafkaConsumer::new(&config.kafka.brokers, "web-analyzer-workers", &consumer_topic) {
        Ok(consumer) => {
            tokio::spawn(async move {
                if let Err(e) = consumer
                    .run(|payload| {
                        let worker = worker_for_consumer.clone();
                        async move { worker.handle_message(payload).await }
                    })
                    .await
                {
                    tracing::error!("kafka consumer loop exited: {e}");
                }
            });
        }
        Err(e) => {
            tracing::error!("failed to start kafka consumer: {e}");
        }
    }

    let app_state = web::Data::new(AppState {
        submission,
        event_stream,
        db_pool: db_pool.clone(),
    });

    let bind_addr = (config.app.host.clone(), config.app.port);
    tracing::info!("listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
