//! Runtime configuration: YAML file merged with CLI overrides.
//!
//! CLI flags win over file values, so a shared config file can be
//! deployed alongside per-host overrides.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use mqttsink_bridge::SessionConfig;
use mqttsink_store::MySqlConfig;

/// Environment variable naming the config file when --config is absent.
const CONFIG_ENV: &str = "MQTTSINK_CONFIG";
/// Fallback config path.
const CONFIG_DEFAULT: &str = "mqttsink.yaml";

/// Log MQTT messages to a database with device discovery.
#[derive(Parser, Debug, Default)]
#[command(name = "mqttsink")]
#[command(about = "Log MQTT messages to a database with device discovery")]
pub struct Args {
    /// Config file path (default: $MQTTSINK_CONFIG or ./mqttsink.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// MQTT topic to subscribe to; may be given multiple times
    #[arg(short, long = "topic")]
    pub topics: Vec<String>,

    /// MQTT broker host
    #[arg(long)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    pub mqtt_port: Option<u16>,

    /// Database host
    #[arg(long)]
    pub db_host: Option<String>,

    /// Database port
    #[arg(long)]
    pub db_port: Option<u16>,

    /// Database user name
    #[arg(long)]
    pub db_user: Option<String>,

    /// Database user password
    #[arg(long)]
    pub db_password: Option<String>,

    /// Database schema
    #[arg(long)]
    pub db_schema: Option<String>,

    /// Table for the message log
    #[arg(long)]
    pub message_table: Option<String>,

    /// Table for device state
    #[arg(long)]
    pub device_table: Option<String>,

    /// Log statements instead of executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Track devices only, skip the message log
    #[arg(long)]
    pub devices_only: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub devices_only: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MqttSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    pub message_table: Option<String>,
    pub device_table: Option<String>,
}

/// Where the classifier's writes go.
pub enum StoreConfig {
    DryRun {
        message_table: Option<String>,
        device_table: Option<String>,
    },
    MySql(MySqlConfig),
}

/// Fully resolved runtime parameters.
pub struct ResolvedConfig {
    pub session: SessionConfig,
    pub store: StoreConfig,
}

/// Merge the config file with CLI overrides and validate.
///
/// Database parameters are only required outside dry-run mode; dry runs
/// work without a live database by design.
pub fn resolve(args: &Args) -> anyhow::Result<ResolvedConfig> {
    let file = load_file(args)?;

    let mqtt = file.mqtt;
    let host = args
        .mqtt_host
        .clone()
        .or(mqtt.host)
        .context("no MQTT host configured")?;
    let port = args.mqtt_port.or(mqtt.port).unwrap_or(1883);
    let topics = if args.topics.is_empty() {
        mqtt.topics
    } else {
        args.topics.clone()
    };

    let session = SessionConfig {
        host,
        port,
        client_id: "mqttsink".to_string(),
        username: mqtt.username,
        password: mqtt.password,
        topics,
        devices_only: args.devices_only || file.devices_only,
    };

    let db = file.database;
    let message_table = args.message_table.clone().or(db.message_table);
    let device_table = args.device_table.clone().or(db.device_table);

    let store = if args.dry_run || file.dry_run {
        StoreConfig::DryRun {
            message_table,
            device_table,
        }
    } else {
        let host = args
            .db_host
            .clone()
            .or(db.host)
            .context("no database host configured")?;
        let user = args
            .db_user
            .clone()
            .or(db.user)
            .context("no database user configured")?;
        let password = args
            .db_password
            .clone()
            .or(db.password)
            .context("no database password configured")?;
        let schema = args
            .db_schema
            .clone()
            .or(db.schema)
            .context("no database schema configured")?;
        let port = args.db_port.or(db.port).unwrap_or(3306);
        StoreConfig::MySql(MySqlConfig {
            host,
            port,
            user,
            password,
            schema,
            message_table,
            device_table,
        })
    };

    Ok(ResolvedConfig { session, store })
}

fn load_file(args: &Args) -> anyhow::Result<FileConfig> {
    let (path, explicit) = match &args.config {
        Some(p) => (p.clone(), true),
        None => match std::env::var(CONFIG_ENV) {
            Ok(p) => (PathBuf::from(p), true),
            Err(_) => (PathBuf::from(CONFIG_DEFAULT), false),
        },
    };

    if !path.is_file() {
        if explicit {
            bail!("config file not found: {}", path.display());
        }
        info!("no config file, using CLI parameters only");
        return Ok(FileConfig::default());
    }

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: FileConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), "loaded config file");
    Ok(file)
}
