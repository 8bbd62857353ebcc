mod api;
mod dao;
mod model;
mod service;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{fs, thread};

use crate::api::middleware::timing_middleware;
use crate::api::security::JwtSecurityService;
use crate::api::state::AppState;
use crate::api::{bumdes_endpoints, endpoints};
use crate::dao::bumdes::{BumdesStore, BundledBumdes, PgBumdesDao};
use crate::dao::documents::{DocumentStore, PgDocumentStore};
use crate::dao::memory::{InMemoryBumdesStore, InMemoryDocumentStore, InMemoryImageStorage};
use crate::dao::storage::{ImageStorage, LocalImageStorage, PublicUrlLayout};
use crate::model::apperror::{ApplicationError, ErrorType};
use crate::model::config::{AppSecurity, ApplicationArguments, Config, DatabaseType, HttpsConfig, JwtKeyType, LoggingConfig, SeedConfig, Storage, StorageType};
use crate::service::budget::BudgetService;
use crate::service::bumdes::BumdesService;
use crate::service::demographics::DemographicService;

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use clap::Parser;
use prometheus::IntGauge;
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys};
use sqlx::pool::PoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_JSON_SIZE: usize = 1024 * 1024;

/**
 * Entry point of the village profile api.
 */
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    init_tracing(&config.logging)?;

    let jwt_service = get_security_service(&config.security)?;

    let (document_store, bumdes_store, connection_pool) = get_stores(&config).await?;
    let image_storage = get_image_storage(&config.storage)?;

    let state = web::Data::new(AppState::new(
        jwt_service,
        DemographicService::new(document_store.clone()),
        BudgetService::new(document_store),
        BumdesService::new(bumdes_store, BundledBumdes::new(), image_storage, config.bumdes.placeholder_image.clone()),
    ));

    seed_on_startup(&state, &config.seed).await;

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    if let Some(connection_pool) = connection_pool {
        let max_connections_gauge = IntGauge::new("max_connections", "Connection pool maximum").map_err(|err| std::io::Error::other(format!("Failed to create max_connections gauge: {err}")))?;
        let min_connections_gauge = IntGauge::new("min_connections", "Connection pool minimum").map_err(|err| std::io::Error::other(format!("Failed to create min_connections gauge: {err}")))?;
        let active_connections_gauge = IntGauge::new("active_connections", "Connection pool active").map_err(|err| std::io::Error::other(format!("Failed to create active_connections gauge: {err}")))?;
        let idle_connections_gauge = IntGauge::new("idle_connections", "Connection pool idle").map_err(|err| std::io::Error::other(format!("Failed to create idle_connections gauge: {err}")))?;
        register_prometheus_metrics(&prometheus, &max_connections_gauge)?;
        register_prometheus_metrics(&prometheus, &min_connections_gauge)?;
        register_prometheus_metrics(&prometheus, &active_connections_gauge)?;
        register_prometheus_metrics(&prometheus, &idle_connections_gauge)?;
        gather_db_metrics(max_connections_gauge, min_connections_gauge, active_connections_gauge, idle_connections_gauge, connection_pool);
    }

    let server_init = HttpServer::new(move || {
        App::new()
            .wrap(prometheus.clone())
            .wrap(from_fn(timing_middleware))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(MAX_JSON_SIZE))
            .configure(endpoints::configure)
            .configure(bumdes_endpoints::configure)
    });

    let server_init = if let Some(http_port) = &config.server.http_port { server_init.bind(("127.0.0.1", *http_port))? } else { server_init };
    let server_init = if let Some(https_config) = &config.server.https_config {
        let ssl_builder = ssl_builder(https_config).map_err(|err| std::io::Error::other(format!("Failed to create SSL/TLS configuration: {err}")))?;
        server_init.bind_rustls_0_23(("127.0.0.1", https_config.port), ssl_builder).map_err(|err| std::io::Error::other(format!("Failed to bind HTTPS server: {err}")))?
    } else {
        server_init
    };

    info!("Starting village profile api with {} workers", config.server.workers);
    server_init.workers(config.server.workers).run().await
}

/**
 * Initializes logging for the application.
 *
 * #Arguments
 * `logging`: What to include in each line, the filter directives and an optional log file.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
fn init_tracing(logging: &LoggingConfig) -> Result<(), std::io::Error> {
    let mut filter = EnvFilter::from_default_env();
    for directive in &logging.directives {
        let directive = directive.parse::<Directive>().map_err(|err| std::io::Error::other(format!("Invalid log directive {directive}: {err}")))?;
        filter = filter.add_directive(directive);
    }
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level)
        .with_ansi(logging.ansi)
        .with_file(logging.file);
    match &logging.logfile {
        Some(logfile) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(logfile)
                .map_err(|err| std::io::Error::other(format!("Failed to open log file {logfile}: {err}")))?;
            tracing_subscriber::registry().with(filter).with(fmt_layer.with_writer(Mutex::new(file))).init();
        }
        None => tracing_subscriber::registry().with(filter).with(fmt_layer).init(),
    }
    Ok(())
}

/**
 * Creates the document store and the BUMDes store.
 *
 * #Arguments
 * `config`: The application configuration.
 *
 * #Returns
 * Both stores and, for `PostgreSQL`, the pool they share.
 */
async fn get_stores(config: &Config) -> Result<(Arc<dyn DocumentStore>, Arc<dyn BumdesStore>, Option<Pool<Postgres>>), std::io::Error> {
    match config.database.db_type.clone() {
        DatabaseType::Postgresql { connection_string, max_connections, min_connections, acquire_timeout, acquire_slow_threshold, idle_timeout, max_lifetime, run_migrations } => {
            let connection_pool: Pool<Postgres> = PoolOptions::new()
                .max_connections(max_connections)
                .min_connections(min_connections)
                .acquire_timeout(Duration::from_millis(acquire_timeout))
                .acquire_slow_threshold(Duration::from_millis(acquire_slow_threshold))
                .idle_timeout(Duration::from_millis(idle_timeout))
                .max_lifetime(Duration::from_millis(max_lifetime))
                .connect(connection_string.as_str())
                .await
                .map_err(|err| std::io::Error::other(format!("Failed to create database pool: {err}")))?;
            if run_migrations {
                sqlx::migrate!("./sqlx-postgresql-migration/migrations")
                    .run(&connection_pool)
                    .await
                    .map_err(|err| std::io::Error::other(format!("Failed to run database migrations: {err}")))?;
            }
            let pg_document_store = PgDocumentStore::new(connection_pool.clone());
            pg_document_store.start_listener().await.map_err(|err| std::io::Error::other(format!("Failed to start document change listener: {err}")))?;
            let document_store: Arc<dyn DocumentStore> = Arc::new(pg_document_store);
            let bumdes_store: Arc<dyn BumdesStore> = Arc::new(PgBumdesDao::new(connection_pool.clone()));
            Ok((document_store, bumdes_store, Some(connection_pool)))
        }
        DatabaseType::InMemory => {
            tracing::warn!("Using in-memory stores, data is lost on restart");
            let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
            let bumdes_store: Arc<dyn BumdesStore> = Arc::new(InMemoryBumdesStore::new());
            Ok((document_store, bumdes_store, None))
        }
    }
}

/**
 * Creates the image storage holding uploaded BUMDes images.
 *
 * #Arguments
 * `storage`: Image storage configuration.
 */
fn get_image_storage(storage: &Storage) -> Result<Arc<dyn ImageStorage>, std::io::Error> {
    let image_storage: Arc<dyn ImageStorage> = match &storage.storage_type {
        StorageType::Local { root_dir, public_base_url, bucket } => {
            let layout = PublicUrlLayout::new(public_base_url, bucket).map_err(|err| std::io::Error::other(format!("Failed to create storage layout: {err}")))?;
            fs::create_dir_all(root_dir).map_err(|err| std::io::Error::other(format!("Failed to create storage directory {root_dir}: {err}")))?;
            Arc::new(LocalImageStorage::new(root_dir, layout))
        }
        StorageType::InMemory { public_base_url, bucket } => {
            let layout = PublicUrlLayout::new(public_base_url, bucket).map_err(|err| std::io::Error::other(format!("Failed to create storage layout: {err}")))?;
            Arc::new(InMemoryImageStorage::new(layout))
        }
    };
    Ok(image_storage)
}

/**
 * Runs the initialization routines when enabled. Failures are logged, the server still starts.
 *
 * #Arguments
 * `state`: The application state.
 * `seed`: Seeding configuration.
 */
async fn seed_on_startup(state: &AppState, seed: &SeedConfig) {
    if !seed.on_startup {
        return;
    }
    let outcome = state.demographic_service.initialize_demographic_data().await;
    info!("Demographic data initialization: {:?}", outcome);
    for year in &seed.budget_years {
        let outcome = state.budget_service.initialize_budget_data(*year).await;
        info!("Budget data initialization for {}: {:?}", year, outcome);
    }
}

/**
 * Registers custom Prometheus metrics.
 *
 * #Arguments
 * `prometheus_metrics`: The Prometheus metrics instance to register the gauge with.
 * `gauge`: The gauge to register.
 */
fn register_prometheus_metrics(prometheus_metrics: &PrometheusMetrics, gauge: &IntGauge) -> Result<(), std::io::Error> {
    prometheus_metrics.registry.register(Box::new(gauge.clone())).map_err(|err| std::io::Error::other(format!("Failed to register Prometheus gauge: {err}")))?;
    Ok(())
}

/**
 * Gathers connection pool metrics in a separate thread.
 *
 * #Arguments
 * `max_connections_gauge`: Gauge for maximum connections.
 * `min_connections_gauge`: Gauge for minimum connections.
 * `active_connections_gauge`: Gauge for active connections.
 * `idle_connections_gauge`: Gauge for idle connections.
 * `connection_pool`: The connection pool to gather metrics from.
 */
fn gather_db_metrics(max_connections_gauge: IntGauge, min_connections_gauge: IntGauge, active_connections_gauge: IntGauge, idle_connections_gauge: IntGauge, connection_pool: Pool<Postgres>) {
    thread::spawn(move || {
        loop {
            max_connections_gauge.set(i64::from(connection_pool.options().get_max_connections()));
            min_connections_gauge.set(i64::from(connection_pool.options().get_min_connections()));
            active_connections_gauge.set(i64::from(connection_pool.size()));
            #[allow(clippy::cast_possible_wrap)]
            idle_connections_gauge.set(connection_pool.num_idle() as i64);
            thread::sleep(Duration::from_secs(1));
        }
    });
}

/**
 * Initializes the SSL/TLS configuration for the server.
 *
 * #Arguments
 * `https_config`: The HTTPS configuration containing the certificate and private key files.
 *
 * #Returns
 * A `Result` containing the initialized `ServerConfig` or an `ApplicationError` if initialization fails.
 */
fn ssl_builder(https_config: &HttpsConfig) -> Result<ServerConfig, ApplicationError> {
    let config_builder = ServerConfig::builder_with_protocol_versions(&get_protocol_versions());
    let cert_file = &mut std::io::BufReader::new(
        fs::File::open(&https_config.certificate_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read certificate file: {err}")))?,
    );
    let key_file = &mut std::io::BufReader::new(
        fs::File::open(&https_config.private_key_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read private key file: {err}")))?,
    );
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>().map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert certificate to der: {err}")))?;
    let private_key = pkcs8_private_keys(key_file)
        .next()
        .ok_or_else(|| ApplicationError::new(ErrorType::Initialization, "No PKCS8 private key found".to_string()))?
        .map(PrivateKeyDer::Pkcs8)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert private key to der: {err}")))?;
    let config = config_builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create server config: {err}")))?;
    Ok(config)
}

/**
 * Returns the supported TLS protocol versions.
 */
fn get_protocol_versions() -> Vec<&'static SupportedProtocolVersion> {
    vec![&rustls::version::TLS13]
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
*/
fn get_config(config_file: &str) -> Result<Config, std::io::Error> {
    let config_str: String = fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    Ok(config)
}

/**
 * Initializes the JWT security service guarding the admin endpoints.
 *
 * #Arguments
 * `app_security`: Application security configuration naming the verification key.
 *
 * #Returns
 * A `Result` containing the initialized `JwtSecurityService` or an `std::io::Error` if initialization fails.
 */
fn get_security_service(app_security: &AppSecurity) -> Result<JwtSecurityService, std::io::Error> {
    let jwt_service = match &app_security.jwt_key {
        JwtKeyType::PublicKeyFile { path, algorithm } => {
            let contents = fs::read_to_string(path).map_err(|err| std::io::Error::other(format!("Failed to read public key file: {err}")))?;
            JwtSecurityService::new(&contents, algorithm)
        }
        JwtKeyType::SharedSecret { secret, algorithm } => JwtSecurityService::new(secret, algorithm),
    };
    jwt_service.map_err(|err| std::io::Error::other(format!("Failed to initialize JWT security: {err}")))
}
