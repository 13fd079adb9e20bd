//! oicbus CLI - offline translation tool for the oicbus bridge
//!
//! Translate names, derive identifiers and map device metadata between the
//! resource protocol and the bus protocol from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use oicbus_bridge::metadata::{self, ObjectDescription, RecordKind};
use oicbus_bridge::{AnnouncementRecord, BridgeConfig};
use oicbus_core::identity::{app_id_from_device_id, platform_id, protocol_independent_id};
use oicbus_core::name::{check_name, to_bus_name, to_resource_name};
use oicbus_core::{is_valid_name, ResourceRecord};
use serde_json::{Map, Value as Json};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// oicbus - bus/resource protocol bridge tooling
#[derive(Parser)]
#[command(name = "oicbus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "OICBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate or validate names
    Name {
        #[command(subcommand)]
        action: NameAction,
    },

    /// Derive device identifiers
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Build an announcement record from resource metadata records
    Announce {
        /// JSON file: an object keyed by resource type (oic.wk.d, oic.wk.p, ...)
        file: PathBuf,
    },

    /// Map resource metadata to an announcement and back to resource records
    Records {
        /// JSON file: an object keyed by resource type (oic.wk.d, oic.wk.p, ...)
        file: PathBuf,

        /// Peer connection id used for the protocol-independent id
        #[arg(long)]
        peer_id: Option<String>,

        /// Announced interfaces as path=iface1,iface2
        #[arg(long = "object")]
        objects: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum NameAction {
    /// Resource-protocol name to bus-protocol name
    ToBus { name: String },
    /// Bus-protocol name to resource-protocol name
    ToResource { name: String },
    /// Validate a bus-protocol interface name
    Validate { name: String },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Protocol-independent id
    Piid {
        /// Device id
        #[arg(long)]
        device_id: Option<String>,
        /// Application id as 32 hex digits; derived from the device id when absent
        #[arg(long)]
        app_id: Option<String>,
        /// Peer connection id
        #[arg(long)]
        peer_id: Option<String>,
        /// Explicit protocol-independent id
        #[arg(long)]
        piid: Option<String>,
    },
    /// Platform id
    Platform {
        #[arg(long)]
        device_id: String,
    },
    /// Application id derived from a device id
    AppId { device_id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    setup_logging(level, cli.json_logs)?;

    match cli.command {
        Commands::Name { action } => run_name(action)?,
        Commands::Identity { action } => run_identity(action)?,
        Commands::Announce { file } => {
            let about = build_announcement(&file, &config)?;
            print_json(&about.to_json())?;
        }
        Commands::Records {
            file,
            peer_id,
            objects,
        } => run_records(&file, &config, peer_id.as_deref(), &objects)?,
        Commands::Config => {
            let text = config.to_toml_string()?;
            print!("{}", text);
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) if path.exists() => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        _ => Ok(BridgeConfig::default()),
    }
}

fn run_name(action: NameAction) -> Result<()> {
    match action {
        NameAction::ToBus { name } => println!("{}", to_bus_name(&name)),
        NameAction::ToResource { name } => println!("{}", to_resource_name(&name)),
        NameAction::Validate { name } => {
            let (valid, end) = is_valid_name(&name);
            match check_name(&name) {
                Ok(()) => println!("{} {}", "valid".green().bold(), name),
                Err(_) if valid => {
                    println!(
                        "{} {} (trailing characters after offset {}: {:?})",
                        "invalid".red().bold(),
                        name,
                        end,
                        &name[end..]
                    );
                    std::process::exit(1);
                }
                Err(e) => {
                    println!("{} {}", "invalid".red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

fn run_identity(action: IdentityAction) -> Result<()> {
    match action {
        IdentityAction::Piid {
            device_id,
            app_id,
            peer_id,
            piid,
        } => {
            let app_id = match (app_id, device_id.as_deref()) {
                (Some(hex), _) => parse_app_id(&hex)?,
                (None, Some(device_id)) => app_id_from_device_id(device_id),
                (None, None) => [0u8; 16],
            };
            let id = protocol_independent_id(
                piid.as_deref(),
                peer_id.as_deref(),
                device_id.as_deref(),
                &app_id,
            )
            .context("Cannot derive a protocol-independent id")?;
            println!("{}", id);
        }
        IdentityAction::Platform { device_id } => {
            println!("{}", platform_id(Some(&device_id))?);
        }
        IdentityAction::AppId { device_id } => {
            let app_id = app_id_from_device_id(&device_id);
            println!("{}", Uuid::from_bytes(app_id).simple());
        }
    }
    Ok(())
}

fn parse_app_id(hex: &str) -> Result<[u8; 16]> {
    let uuid = Uuid::try_parse(hex).with_context(|| format!("Invalid application id {}", hex))?;
    Ok(*uuid.as_bytes())
}

/// Read a JSON object keyed by resource type into metadata records
fn read_records(path: &Path) -> Result<Vec<(RecordKind, ResourceRecord)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let json: Json = serde_json::from_str(&text).context("Invalid JSON")?;
    let Json::Object(map) = json else {
        bail!("{}: expected an object keyed by resource type", path.display());
    };

    let mut records = Vec::new();
    for (rt, value) in map {
        let Some(kind) = RecordKind::from_resource_type(&rt) else {
            warn!(resource_type = %rt, "Skipping unknown resource type");
            continue;
        };
        let record = ResourceRecord::from_json(&value)
            .with_context(|| format!("Invalid {} record", rt))?;
        debug!(resource_type = %rt, fields = record.len(), "Read record");
        records.push((kind, record));
    }
    Ok(records)
}

fn build_announcement(path: &Path, config: &BridgeConfig) -> Result<AnnouncementRecord> {
    let mut about = match &config.default_language {
        Some(language) => AnnouncementRecord::with_default_language(language),
        None => AnnouncementRecord::new(),
    };
    for (kind, record) in read_records(path)? {
        metadata::apply_record(&mut about, kind, &record)
            .with_context(|| format!("Failed to map {}", kind.resource_type()))?;
    }
    if !metadata::is_valid(&mut about) {
        bail!("Announcement record is not valid: {:?}", about.check_compatible().err());
    }
    info!(fields = about.field_names().count(), "Announcement record built");
    Ok(about)
}

fn parse_object(arg: &str) -> Result<ObjectDescription> {
    let Some((path, interfaces)) = arg.split_once('=') else {
        bail!("Invalid object {}: expected path=iface1,iface2", arg);
    };
    let interfaces: Vec<&str> = interfaces.split(',').filter(|s| !s.is_empty()).collect();
    Ok(ObjectDescription::new(path, &interfaces))
}

fn run_records(
    path: &Path,
    config: &BridgeConfig,
    peer_id: Option<&str>,
    objects: &[String],
) -> Result<()> {
    let about = build_announcement(path, config)?;
    let objects = objects
        .iter()
        .map(|o| parse_object(o))
        .collect::<Result<Vec<_>>>()?;

    let mut out = Map::new();
    let device = metadata::device_properties(&about, &objects, |_| None, peer_id)?;
    out.insert(RecordKind::Device.resource_type().to_string(), device.to_json());
    let platform = metadata::platform_properties(&about)?;
    out.insert(RecordKind::Platform.resource_type().to_string(), platform.to_json());
    let device_config = metadata::device_configuration_properties(&about)?;
    out.insert(
        RecordKind::DeviceConfiguration.resource_type().to_string(),
        device_config.to_json(),
    );
    let platform_config = metadata::platform_configuration_properties(&about)?;
    out.insert(
        RecordKind::PlatformConfiguration.resource_type().to_string(),
        platform_config.to_json(),
    );
    print_json(&Json::Object(out))
}

fn print_json(json: &Json) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(json)?);
    Ok(())
}
