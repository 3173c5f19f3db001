use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::{RecvTimeoutError, bounded};
use log::{debug, error, info};
use netstrap::arp::{ArpingBroadcaster, NetlinkAddressResolver};
use netstrap::config::AgentConfig;
use netstrap::constants;
use netstrap::dns::HickoryDnsResolver;
use netstrap::fs::HostFileSystem;
use netstrap::http::ReqwestTransport;
use netstrap::logger::init_logger;
use netstrap::metadata::HttpMetadataService;
use netstrap::net_manager::{NetManager, NetworkPlatform};
use netstrap::system::HostCmdRunner;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DNS_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Use eprintln! here in case logger does not initialize.
            eprintln!("Failed to set up networking: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| constants::FILE_CONFIG.into());
    let config = AgentConfig::load(&config_path)?;
    init_logger(config.level()?).map_err(|e| anyhow!("unable to initialize logger: {}", e))?;
    debug!("Configuration: {:?}", config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("unable to start tokio runtime: {}", e))?;

    let fs = Arc::new(HostFileSystem);
    let cmd_runner = Arc::new(HostCmdRunner::new());
    let broadcaster = Arc::new(ArpingBroadcaster::new(
        fs.clone(),
        cmd_runner.clone(),
        config.arp,
    ));
    let net_manager = Arc::new(NetManager::new(
        fs.clone(),
        cmd_runner,
        Arc::new(NetlinkAddressResolver::new(rt.handle().clone())),
        broadcaster,
        config.platform.renderer(),
    ));
    let metadata = HttpMetadataService::new(
        &config.metadata,
        net_manager.clone(),
        fs,
        Arc::new(HickoryDnsResolver::new(rt.handle().clone(), DNS_TIMEOUT)),
        Arc::new(ReqwestTransport::new(rt.handle().clone(), HTTP_TIMEOUT)?),
    );

    if let Ok(id) = metadata.get_instance_id() {
        info!("Instance ID: {}", id.trim());
    }
    let networks = metadata
        .get_networks()
        .map_err(|e| anyhow!("unable to get networks from metadata: {:#}", e))?;
    info!("Configuring {} networks", networks.len());

    let (result_tx, result_rx) = bounded(1);
    net_manager.setup_networking(&networks, Some(result_tx))?;

    match result_rx.recv_timeout(config.broadcast_wait) {
        Ok(Ok(())) => info!("Network configured"),
        Ok(Err(e)) => error!("Unable to broadcast MAC addresses: {}", e),
        // Nothing was bound, so no broadcast ran.
        Err(RecvTimeoutError::Disconnected) => info!("Network configured"),
        Err(RecvTimeoutError::Timeout) => error!(
            "Timeout waiting {:?} for MAC address broadcast",
            config.broadcast_wait
        ),
    }
    Ok(())
}
