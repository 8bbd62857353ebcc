use clap::{Parser, command};
use serde::{Deserialize, Serialize};

/**
 * Command-line arguments for the application.
 */
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ApplicationArguments {
    /**
     * Path to the configuration file.
     */
    #[arg(short, long)]
    pub config_file: String,
}

/**
 * Represents the configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /**
     * Logging configuration for the application.
     */
    pub logging: LoggingConfig,
    /**
     * Security configuration for the application.
     */
    pub security: AppSecurity,
    /**
     * Server configuration for the application.
     */
    pub server: Server,
    /**
     * Database configuration for the application.
     */
    pub database: Database,
    /**
     * Image storage configuration for the application.
     */
    pub storage: Storage,
    /**
     * BUMDes catalog settings.
     */
    #[serde(default)]
    pub bumdes: BumdesConfig,
    /**
     * Start-up seeding of demographic and budget data.
     */
    #[serde(default)]
    pub seed: SeedConfig,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /**
     * Whether to log the target of the log message.
     */
    pub target: bool,
    /**
     * Whether to log thread IDs .
     */
    pub thread_ids: bool,
    /**
     * Whether to log thread names.
     */
    pub thread_names: bool,
    /**
     * Whether to log line numbers.
     */
    pub line_number: bool,
    /**
     * Whether to log the log level.
     */
    pub level: bool,
    /**
     * Whether to use ANSI colors in logs.
     */
    pub ansi: bool,
    /**
     * Whether to log source file names.
     */
    pub file: bool,
    /**
     * Path to the log file. Logs go to stdout when absent.
     */
    pub logfile: Option<String>,
    /**
     * Additional directives for logging configuration.
     */
    pub directives: Vec<String>,
}

impl LoggingConfig {
    #[allow(dead_code)]
    pub fn default() -> Self {
        LoggingConfig {
            target: true,
            thread_ids: true,
            thread_names: true,
            line_number: true,
            level: true,
            ansi: true,
            file: true,
            logfile: Some("/tmp/village_profile_api.log".to_string()),
            directives: vec!["info".to_string()],
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /**
     * Type of the database (e.g., `PostgreSQL`).
     */
    pub db_type: DatabaseType,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseType {
    /**
     * `PostgreSQL` database type. Holds both the document store and the `bumdes` table.
     */
    #[serde(rename_all = "camelCase")]
    Postgresql {
        connection_string: String,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: u64,
        acquire_slow_threshold: u64,
        idle_timeout: u64,
        max_lifetime: u64,
        #[serde(default)]
        run_migrations: bool,
    },
    /**
     * Process local storage. Data is lost on restart.
     */
    InMemory,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSecurity {
    /**
     * Key used to verify admin bearer tokens.
     */
    pub jwt_key: JwtKeyType,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub enum JwtKeyType {
    /**
     * PEM encoded public key file (RSA, EC or Ed25519).
     */
    #[serde(rename_all = "camelCase")]
    PublicKeyFile { path: String, algorithm: String },
    /**
     * Shared secret for hmac.
     */
    #[serde(rename_all = "camelCase")]
    SharedSecret { secret: String, algorithm: String },
}

/**
 * Represents the server configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /**
     * Number of worker threads for the server.
     */
    pub workers: usize,
    /**
     * HTTP port for the server.
     */
    pub http_port: Option<u16>,
    /**
     * HTTPS configuration for the server.
     */
    pub https_config: Option<HttpsConfig>,
}

/**
 * Represents the HTTPS configuration for the server.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsConfig {
    /**
     * Port for the HTTPS server.
     */
    pub port: u16,
    /**
     * Path to the certificate file.
     */
    pub certificate_file: String,
    /**
     * Path to the private key file.
     */
    pub private_key_file: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    pub storage_type: StorageType,
}

/**
 * Where uploaded images are kept. Public urls are built as
 * `{publicBaseUrl}/storage/v1/object/public/{bucket}/{path}`.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    #[serde(rename_all = "camelCase")]
    Local { root_dir: String, public_base_url: String, bucket: String },
    #[serde(rename_all = "camelCase")]
    InMemory { public_base_url: String, bucket: String },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BumdesConfig {
    /**
     * Image url used for entries created without an image.
     */
    pub placeholder_image: String,
}

impl Default for BumdesConfig {
    fn default() -> Self {
        BumdesConfig { placeholder_image: "/placeholder.jpg".to_string() }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedConfig {
    /**
     * Run the initialization routines when the server starts.
     */
    pub on_startup: bool,
    /**
     * Fiscal years to initialize budget data for.
     */
    pub budget_years: Vec<i32>,
}
