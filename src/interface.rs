use std::collections::HashMap;
use std::path::Path;

use anyhow::{Result, anyhow};
use log::{debug, warn};

use crate::constants::{SYS_NET_ADDRESS, SYS_NET_DEVICE};
use crate::fs::FileSystem;
use crate::settings::{Network, Networks};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalInterface {
    pub name: String,
    pub mac: String,
    pub is_physical: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub interface: String,
    pub network_name: String,
    pub network: Network,
}

pub(crate) fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

pub fn discover_interfaces(
    fs: &dyn FileSystem,
    sys_class_net: &Path,
) -> Result<Vec<PhysicalInterface>> {
    let entries = fs
        .list_dir(sys_class_net)
        .map_err(|e| anyhow!("unable to list network interfaces: {}", e))?;

    let mut interfaces = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = match entry.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        let mac = fs
            .read_file_string(&entry.join(SYS_NET_ADDRESS))
            .map_err(|e| anyhow!("unable to read MAC address of {}: {}", name, e))?;
        let is_physical = fs.exists(&entry.join(SYS_NET_DEVICE));
        debug!(
            "Discovered interface {}: mac={}, physical={}",
            name,
            mac.trim(),
            is_physical
        );
        interfaces.push(PhysicalInterface {
            name,
            mac: normalize_mac(&mac),
            is_physical,
        });
    }
    Ok(interfaces)
}

/// Bind each network to a physical interface.
///
/// A network with a MAC address goes to the physical interface with that MAC,
/// and is skipped if there is none. A network without a MAC address goes to
/// the only physical interface on the host, or, on hosts with several, to the
/// physical interface named like the network. Virtual interfaces are never
/// bound. The result is sorted by interface name.
pub fn associate(interfaces: &[PhysicalInterface], networks: &Networks) -> Result<Vec<Binding>> {
    let physical: Vec<&PhysicalInterface> = interfaces.iter().filter(|i| i.is_physical).collect();

    let mut mac_owners: HashMap<String, &str> = HashMap::new();
    for (name, network) in networks.iter().filter(|(_, n)| n.has_mac()) {
        let mac = normalize_mac(&network.mac);
        if let Some(other) = mac_owners.insert(mac.clone(), name.as_str()) {
            return Err(anyhow!(
                "networks {} and {} both specify MAC address {}",
                other,
                name,
                mac
            ));
        }
    }

    let mut bindings: Vec<Binding> = Vec::new();
    for (name, network) in networks {
        let interface = if network.has_mac() {
            let mac = normalize_mac(&network.mac);
            match physical.iter().copied().find(|i| i.mac == mac) {
                Some(i) => i,
                None => {
                    warn!(
                        "No physical interface found for network {} with MAC address {}",
                        name, mac
                    );
                    continue;
                }
            }
        } else if physical.len() == 1 {
            physical[0]
        } else if let Some(i) = physical.iter().copied().find(|i| i.name == *name) {
            i
        } else {
            return Err(anyhow!(
                "network {} does not specify a MAC address and there are {} physical interfaces",
                name,
                physical.len()
            ));
        };

        if let Some(existing) = bindings.iter().find(|b| b.interface == interface.name) {
            return Err(anyhow!(
                "networks {} and {} are both bound to interface {}",
                existing.network_name,
                name,
                interface.name
            ));
        }
        debug!("Binding network {} to interface {}", name, interface.name);
        bindings.push(Binding {
            interface: interface.name.clone(),
            network_name: name.clone(),
            network: network.clone(),
        });
    }

    bindings.sort_by(|a, b| a.interface.cmp(&b.interface));
    Ok(bindings)
}
