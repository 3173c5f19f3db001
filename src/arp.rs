use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use crossbeam::channel::unbounded;
use crossbeam::sync::WaitGroup;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::runtime::Handle as RtHandle;

use crate::backoff::{RetryBackoff, millis};
use crate::constants::{CMD_ARPING, DIR_SYS_CLASS_NET};
use crate::fs::FileSystem;
use crate::netlink::NetlinkConnection;
use crate::system::CmdRunner;

pub trait AddressResolver: Send + Sync {
    fn primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr>;
}

#[derive(Clone)]
pub enum InterfaceAddress {
    Simple {
        interface: String,
        ip: String,
    },
    Resolving {
        interface: String,
        resolver: Arc<dyn AddressResolver>,
    },
}

impl InterfaceAddress {
    pub fn simple(interface: &str, ip: &str) -> Self {
        InterfaceAddress::Simple {
            interface: interface.into(),
            ip: ip.into(),
        }
    }

    pub fn resolving(interface: &str, resolver: Arc<dyn AddressResolver>) -> Self {
        InterfaceAddress::Resolving {
            interface: interface.into(),
            resolver,
        }
    }

    pub fn interface(&self) -> &str {
        match self {
            InterfaceAddress::Simple { interface, .. } => interface,
            InterfaceAddress::Resolving { interface, .. } => interface,
        }
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self, InterfaceAddress::Resolving { .. })
    }

    pub fn ip(&self) -> Result<String> {
        match self {
            InterfaceAddress::Simple { ip, .. } => Ok(ip.clone()),
            InterfaceAddress::Resolving {
                interface,
                resolver,
            } => resolver
                .primary_ipv4(interface)
                .map(|ip| ip.to_string())
                .map_err(|e| anyhow!("unable to resolve address of {}: {}", interface, e)),
        }
    }
}

impl fmt::Debug for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceAddress::Simple { interface, ip } => f
                .debug_struct("Simple")
                .field("interface", interface)
                .field("ip", ip)
                .finish(),
            InterfaceAddress::Resolving { interface, .. } => f
                .debug_struct("Resolving")
                .field("interface", interface)
                .finish_non_exhaustive(),
        }
    }
}

pub trait AddressBroadcaster: Send + Sync {
    fn broadcast_mac_addresses(&self, addresses: Vec<InterfaceAddress>) -> Result<()>;
}

/// Resolves addresses with rtnetlink on the given tokio runtime. Must not be
/// called from a runtime worker thread.
#[derive(Clone, Debug)]
pub struct NetlinkAddressResolver {
    rt: RtHandle,
}

impl NetlinkAddressResolver {
    pub fn new(rt: RtHandle) -> Self {
        Self { rt }
    }
}

impl AddressResolver for NetlinkAddressResolver {
    fn primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr> {
        self.rt.block_on(async {
            let nl = NetlinkConnection::new()?;
            nl.first_ipv4_address(interface).await
        })
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ArpSettings {
    pub iterations: u32,
    #[serde(rename = "delay-ms", with = "millis")]
    pub delay: Duration,
    #[serde(rename = "interface-timeout-ms", with = "millis")]
    pub interface_timeout: Duration,
}

impl Default for ArpSettings {
    fn default() -> Self {
        Self {
            iterations: 6,
            delay: Duration::from_secs(10),
            interface_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct ArpingBroadcaster {
    fs: Arc<dyn FileSystem>,
    cmd_runner: Arc<dyn CmdRunner>,
    settings: ArpSettings,
    sys_class_net: PathBuf,
}

impl ArpingBroadcaster {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd_runner: Arc<dyn CmdRunner>,
        settings: ArpSettings,
    ) -> Self {
        Self {
            fs,
            cmd_runner,
            settings,
            sys_class_net: PathBuf::from(DIR_SYS_CLASS_NET),
        }
    }

    fn announce(&self, address: &InterfaceAddress) -> Result<()> {
        let interface = address.interface();
        wait_for_interface(
            self.fs.as_ref(),
            &self.sys_class_net.join(interface),
            self.settings.interface_timeout,
        )?;

        let iterations = self.settings.iterations.max(1);
        let mut first_error = None;
        for i in 0..iterations {
            let result = address.ip().and_then(|ip| {
                self.cmd_runner
                    .run_command(CMD_ARPING, &["-c", "1", "-U", "-I", interface, &ip])
                    .map(|_| ())
            });
            if let Err(e) = result {
                warn!(
                    "ARP announcement {}/{} on {} failed: {}",
                    i + 1,
                    iterations,
                    interface,
                    e
                );
                first_error.get_or_insert(e);
            }
            if i + 1 < iterations && !self.settings.delay.is_zero() {
                thread::sleep(self.settings.delay);
            }
        }
        match first_error {
            Some(e) => Err(anyhow!("unable to broadcast MAC address of {}: {}", interface, e)),
            None => Ok(()),
        }
    }
}

impl AddressBroadcaster for ArpingBroadcaster {
    fn broadcast_mac_addresses(&self, addresses: Vec<InterfaceAddress>) -> Result<()> {
        info!("Broadcasting MAC addresses of {} interfaces", addresses.len());
        let wait_group = WaitGroup::new();
        let (err_tx, err_rx) = unbounded::<anyhow::Error>();

        for address in addresses {
            let broadcaster = self.clone();
            let wg = wait_group.clone();
            let err_tx = err_tx.clone();
            thread::spawn(move || {
                if let Err(e) = broadcaster.announce(&address) {
                    let _ = err_tx.send(e);
                }
                drop(wg);
            });
        }
        drop(err_tx);

        wait_group.wait();
        match err_rx.try_iter().next() {
            Some(e) => Err(e),
            None => {
                debug!("MAC addresses broadcast");
                Ok(())
            }
        }
    }
}

fn wait_for_interface(fs: &dyn FileSystem, path: &Path, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let mut backoff = RetryBackoff::new(Duration::from_secs(1));
    while !fs.exists(path) {
        if start.elapsed() >= timeout {
            return Err(anyhow!(
                "interface {:?} did not appear within {:?}",
                path,
                timeout
            ));
        }
        backoff.wait();
    }
    Ok(())
}
