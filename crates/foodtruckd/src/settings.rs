//! Runtime settings, resolved in layers.
//!
//! Later layers win: built-in defaults, then an optional TOML file, then
//! Cloud Foundry `VCAP_SERVICES` credentials, then command-line flags and
//! their environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use foodtruck_store::DatabaseConfig;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Service label whose credentials point at the database.
const CLOUDANT_LABEL: &str = "cloudantNoSQLDB";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub http_port: u16,
    pub database: DatabaseConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            database: DatabaseConfig::default(),
        }
    }
}

/// Database flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct DatabaseArgs {
    /// TOML settings file with `[server]` and `[database]` tables.
    #[arg(long, env = "FOODTRUCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database host. Anything but `localhost` is reached over https.
    #[arg(long = "db-host", env = "FOODTRUCK_DB_HOST")]
    pub host: Option<String>,

    #[arg(long = "db-port", env = "FOODTRUCK_DB_PORT")]
    pub port: Option<u16>,

    #[arg(long = "db-name", env = "FOODTRUCK_DB_NAME")]
    pub name: Option<String>,

    #[arg(long = "db-username", env = "FOODTRUCK_DB_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "db-password", env = "FOODTRUCK_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Upper bound for a single store call, in seconds.
    #[arg(long = "db-timeout", env = "FOODTRUCK_DB_TIMEOUT")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server: ServerSection,
    database: DatabaseSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DatabaseSection {
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// Credentials block of a bound service.
#[derive(Debug, Default, PartialEq)]
struct ServiceCredentials {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
}

impl Settings {
    /// Resolve settings from every layer. `vcap_services` is the raw
    /// `VCAP_SERVICES` value, if set.
    pub fn load(
        args: &DatabaseArgs,
        http_port: Option<u16>,
        vcap_services: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = &args.config {
            settings.apply_file(path)?;
        }
        if let Some(raw) = vcap_services {
            settings.apply_vcap(raw)?;
        }
        settings.apply_args(args);
        if let Some(port) = http_port {
            settings.http_port = port;
        }

        debug!(
            host = %settings.database.host,
            port = settings.database.port,
            database = %settings.database.database_name,
            authenticated = settings.database.username.is_some(),
            "settings resolved"
        );
        Ok(settings)
    }

    fn apply_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let file: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parsing settings file {}", path.display()))?;

        if let Some(port) = file.server.port {
            self.http_port = port;
        }
        let db = &mut self.database;
        let section = file.database;
        set(&mut db.database_name, section.name);
        set(&mut db.host, section.host);
        set(&mut db.port, section.port);
        set_some(&mut db.username, section.username);
        set_some(&mut db.password, section.password);
        set(&mut db.request_timeout, section.request_timeout_secs.map(Duration::from_secs));
        info!(path = %path.display(), "settings file loaded");
        Ok(())
    }

    fn apply_vcap(&mut self, raw: &str) -> anyhow::Result<()> {
        let services: Value = serde_json::from_str(raw).context("parsing VCAP_SERVICES")?;
        let Some(credentials) = cloudant_credentials(&services) else {
            info!("no {CLOUDANT_LABEL} service bound; keeping configured database");
            return Ok(());
        };

        let db = &mut self.database;
        set(&mut db.host, credentials.host);
        set(&mut db.port, credentials.port);
        set_some(&mut db.username, credentials.username);
        set_some(&mut db.password, credentials.password);
        info!(host = %db.host, "using bound {CLOUDANT_LABEL} service");
        Ok(())
    }

    fn apply_args(&mut self, args: &DatabaseArgs) {
        let db = &mut self.database;
        set(&mut db.host, args.host.clone());
        set(&mut db.port, args.port);
        set(&mut db.database_name, args.name.clone());
        set_some(&mut db.username, args.username.clone());
        set_some(&mut db.password, args.password.clone());
        set(&mut db.request_timeout, args.timeout_secs.map(Duration::from_secs));
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Credentials of the first service labelled `cloudantNoSQLDB`, across every
/// service group.
fn cloudant_credentials(services: &Value) -> Option<ServiceCredentials> {
    let service = services
        .as_object()?
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .find(|service| service.get("label").and_then(Value::as_str) == Some(CLOUDANT_LABEL))?;
    let credentials = service.get("credentials")?;

    let text = |name: &str| credentials.get(name).and_then(Value::as_str).map(str::to_string);
    let port = credentials.get("port").and_then(|port| match port {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });

    Some(ServiceCredentials {
        host: text("host"),
        port,
        username: text("username"),
        password: text("password"),
    })
}
