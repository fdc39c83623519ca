//! vmware-netbox-sync - reconcile vCenter clusters, VMs and interfaces into
//! NetBox in one batch run.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use vmware_netbox_sync::config::{AppConfig, ConfigOverrides, Credentials};
use vmware_netbox_sync::error::{SyncError, SyncResult};
use vmware_netbox_sync::inventory::{NetboxClient, VcenterClient};
use vmware_netbox_sync::logging::{self, LogFormat};
use vmware_netbox_sync::sync::{SyncEngine, SyncStats};

/// Sync vCenter inventory into NetBox
#[derive(Parser, Debug)]
#[command(name = "vmware-netbox-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log the decided changes without writing to NetBox
    #[arg(long)]
    dry_run: bool,

    /// Record only the first changed of vcpu, memory and comment per VM
    #[arg(long)]
    legacy_change_detection: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level, cli.log_format) {
        eprintln!("Error: {:#}", e);
        return exit_code(&SyncError::Config(e.to_string()));
    }

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            exit_code(&e)
        }
    }
}

async fn run(cli: Cli) -> SyncResult<SyncStats> {
    let credentials = Credentials::from_env()?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&ConfigOverrides {
        dry_run: cli.dry_run,
        legacy_change_detection: cli.legacy_change_detection,
    });

    let vcenter = Arc::new(
        VcenterClient::new(
            &credentials.vcenter_hostname,
            &credentials.vcenter_username,
            &credentials.vcenter_password,
            &config.vcenter,
        )
        .map_err(SyncError::SourceUnavailable)?,
    );
    let netbox = Arc::new(
        NetboxClient::new(
            &credentials.netbox_api_uri,
            &credentials.netbox_api_token,
            &config.netbox,
        )
        .map_err(SyncError::StoreUnavailable)?,
    );

    let engine = SyncEngine::new(vcenter.clone(), netbox, config.sync_settings());
    let result = engine.run().await;

    if let Err(e) = vcenter.logout().await {
        warn!("Failed to log out of vCenter: {:#}", e);
    }

    result
}

fn exit_code(error: &SyncError) -> ExitCode {
    ExitCode::from(error.exit_code() as u8)
}
