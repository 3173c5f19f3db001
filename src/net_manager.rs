//! The network bootstrap pass.
//!
//! `discover -> associate -> configure -> render -> restart? -> broadcast`.
//! Everything up to the restart runs on the caller's thread and stops at the
//! first failure. Files written before a failure are left in place. The ARP
//! broadcast runs on its own thread and reports through an optional channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam::channel::Sender;
use log::{debug, info, warn};

use crate::arp::{AddressBroadcaster, AddressResolver, InterfaceAddress};
use crate::constants::DIR_SYS_CLASS_NET;
use crate::fs::FileSystem;
use crate::ifconfig::{InterfaceConfiguration, InterfaceConfigurationCreator};
use crate::interface::{Binding, associate, discover_interfaces};
use crate::render::{Artifact, RenderInput, Renderer};
use crate::settings::{Networks, NetworksExt};
use crate::system::CmdRunner;

/// Host networking as seen by the metadata client.
pub trait NetworkPlatform: Send + Sync {
    /// Physical interfaces that already have OS network configuration.
    fn configured_network_interfaces(&self) -> Result<Vec<String>>;

    /// Configure the host for `networks`. Returns once configuration is
    /// committed. The outcome of the ARP broadcast that follows is offered
    /// once on `result_tx` without blocking, so the sender needs room for one
    /// message (`bounded(1)`) or the outcome is only logged.
    fn setup_networking(
        &self,
        networks: &Networks,
        result_tx: Option<Sender<Result<()>>>,
    ) -> Result<()>;
}

pub struct NetManager {
    fs: Arc<dyn FileSystem>,
    cmd_runner: Arc<dyn CmdRunner>,
    resolver: Arc<dyn AddressResolver>,
    broadcaster: Arc<dyn AddressBroadcaster>,
    renderer: Box<dyn Renderer>,
    creator: InterfaceConfigurationCreator,
    sys_class_net: PathBuf,
}

impl NetManager {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd_runner: Arc<dyn CmdRunner>,
        resolver: Arc<dyn AddressResolver>,
        broadcaster: Arc<dyn AddressBroadcaster>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            fs,
            cmd_runner,
            resolver,
            broadcaster,
            renderer,
            creator: InterfaceConfigurationCreator::new(),
            sys_class_net: PathBuf::from(DIR_SYS_CLASS_NET),
        }
    }

    fn bind(&self, networks: &Networks) -> Result<Vec<Binding>> {
        let interfaces = discover_interfaces(self.fs.as_ref(), &self.sys_class_net)
            .context("unable to discover network interfaces")?;
        associate(&interfaces, &networks.without_vips())
    }

    fn create_configurations(&self, bindings: &[Binding]) -> Result<Vec<InterfaceConfiguration>> {
        bindings
            .iter()
            .map(|b| self.creator.create(&b.network, &b.interface))
            .collect()
    }

    // Returns whether any regular file changed. Symlinks are kept pointing
    // at the right target but never trigger a restart on their own.
    fn write_artifacts(&self, artifacts: &[Artifact]) -> Result<bool> {
        let mut changed = false;
        for artifact in artifacts {
            let artifact_changed = match artifact {
                Artifact::File { path, contents } => {
                    let file_changed = self
                        .fs
                        .converge_file_contents(path, contents.as_bytes())
                        .with_context(|| {
                            format!("unable to write network configuration {:?}", path)
                        })?;
                    changed |= file_changed;
                    file_changed
                }
                Artifact::Symlink { path, target } => self
                    .fs
                    .converge_symlink(target, path)
                    .with_context(|| format!("unable to link {:?} to {:?}", path, target))?,
            };
            log_artifact(artifact.path(), artifact_changed);
        }
        Ok(changed)
    }

    fn restart_networking(&self) -> Result<()> {
        let (cmd, args) = self.renderer.restart_command();
        info!("Restarting networking");
        self.cmd_runner.run_command(cmd, args)?;
        Ok(())
    }

    fn interface_addresses(&self, input: &RenderInput) -> Vec<InterfaceAddress> {
        let statics = input
            .statics
            .iter()
            .map(|c| InterfaceAddress::simple(&c.name, &c.address.to_string()));
        let dhcps = input
            .dhcps
            .iter()
            .map(|c| InterfaceAddress::resolving(&c.name, Arc::clone(&self.resolver)));
        statics.chain(dhcps).collect()
    }

    fn broadcast(&self, addresses: Vec<InterfaceAddress>, result_tx: Option<Sender<Result<()>>>) {
        let broadcaster = Arc::clone(&self.broadcaster);
        thread::spawn(move || {
            report_broadcast(broadcaster.broadcast_mac_addresses(addresses), result_tx);
        });
    }
}

fn report_broadcast(result: Result<()>, result_tx: Option<Sender<Result<()>>>) {
    let unreported = match result_tx {
        Some(tx) => match tx.try_send(result) {
            Ok(()) => return,
            Err(e) => {
                warn!("Unable to report broadcast result: {}", e);
                e.into_inner()
            }
        },
        None => result,
    };
    if let Err(e) = unreported {
        warn!("{}", e);
    }
}

fn log_artifact(path: &Path, changed: bool) {
    if changed {
        info!("Updated {:?}", path);
    } else {
        debug!("{:?} is up to date", path);
    }
}

// DNS servers for the host come from the configuration marked as default for
// DNS, or from the only configuration when there is just one.
fn host_dns_servers(configs: &[InterfaceConfiguration]) -> Vec<String> {
    let default = match configs {
        [only] => Some(only),
        _ => configs.iter().find(|c| c.is_default_for_dns()),
    };
    default.map(|c| c.dns().to_vec()).unwrap_or_default()
}

fn render_input(configs: Vec<InterfaceConfiguration>) -> RenderInput {
    let mut input = RenderInput {
        dns_servers: host_dns_servers(&configs),
        ..Default::default()
    };
    for config in configs {
        match config {
            InterfaceConfiguration::Static(c) => input.statics.push(c),
            InterfaceConfiguration::Dhcp(c) => input.dhcps.push(c),
        }
    }
    input
}

impl NetworkPlatform for NetManager {
    fn configured_network_interfaces(&self) -> Result<Vec<String>> {
        let interfaces = discover_interfaces(self.fs.as_ref(), &self.sys_class_net)
            .context("unable to discover network interfaces")?;
        let mut configured = Vec::new();
        for interface in interfaces.iter().filter(|i| i.is_physical) {
            if self.renderer.is_configured(self.fs.as_ref(), &interface.name)? {
                configured.push(interface.name.clone());
            }
        }
        Ok(configured)
    }

    fn setup_networking(
        &self,
        networks: &Networks,
        result_tx: Option<Sender<Result<()>>>,
    ) -> Result<()> {
        let bindings = self.bind(networks)?;
        if bindings.is_empty() {
            info!("No networks bound to interfaces, leaving network configuration as is");
            return Ok(());
        }

        let configs = self
            .create_configurations(&bindings)
            .context("unable to create interface configurations")?;
        let input = render_input(configs);

        let artifacts = self.renderer.render(&input);
        if self.write_artifacts(&artifacts)? {
            self.restart_networking()?;
        } else {
            debug!("Network configuration unchanged, not restarting networking");
        }

        self.broadcast(self.interface_addresses(&input), result_tx);
        Ok(())
    }
}
