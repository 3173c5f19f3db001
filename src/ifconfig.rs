use std::fmt;
use std::net::Ipv4Addr;

use anyhow::{Result, anyhow};

use crate::settings::{DEFAULT_DNS, Network, NetworkType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub interface: String,
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} {:?} for interface {}: not an IPv4 address",
            self.field, self.value, self.interface
        )
    }
}

impl std::error::Error for ValidationError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticInterfaceConfiguration {
    pub name: String,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub network: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub dns: Vec<String>,
    pub is_default_for_dns: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DhcpInterfaceConfiguration {
    pub name: String,
    pub dns: Vec<String>,
    pub is_default_for_dns: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceConfiguration {
    Static(StaticInterfaceConfiguration),
    Dhcp(DhcpInterfaceConfiguration),
}

impl InterfaceConfiguration {
    pub fn dns(&self) -> &[String] {
        match self {
            InterfaceConfiguration::Static(c) => &c.dns,
            InterfaceConfiguration::Dhcp(c) => &c.dns,
        }
    }

    pub fn is_default_for_dns(&self) -> bool {
        match self {
            InterfaceConfiguration::Static(c) => c.is_default_for_dns,
            InterfaceConfiguration::Dhcp(c) => c.is_default_for_dns,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InterfaceConfigurationCreator;

impl InterfaceConfigurationCreator {
    pub fn new() -> Self {
        Self
    }

    pub fn create(&self, network: &Network, interface: &str) -> Result<InterfaceConfiguration> {
        let is_default_for_dns = network.is_default_for(DEFAULT_DNS);
        match network.network_type {
            NetworkType::Dynamic => Ok(InterfaceConfiguration::Dhcp(DhcpInterfaceConfiguration {
                name: interface.into(),
                dns: network.dns.clone(),
                is_default_for_dns,
            })),
            NetworkType::Manual => {
                let address = parse_ipv4(interface, "IP address", &network.ip)?;
                let netmask = parse_ipv4(interface, "netmask", &network.netmask)?;
                let gateway = if network.gateway.trim().is_empty() {
                    None
                } else {
                    Some(parse_ipv4(interface, "gateway", &network.gateway)?)
                };
                Ok(InterfaceConfiguration::Static(StaticInterfaceConfiguration {
                    name: interface.into(),
                    address,
                    netmask,
                    network: network_address(address, netmask),
                    broadcast: broadcast_address(address, netmask),
                    gateway,
                    dns: network.dns.clone(),
                    is_default_for_dns,
                }))
            }
            NetworkType::Vip => Err(anyhow!(
                "vip networks cannot be configured on interface {}",
                interface
            )),
        }
    }
}

fn parse_ipv4(interface: &str, field: &'static str, value: &str) -> Result<Ipv4Addr> {
    value.trim().parse::<Ipv4Addr>().map_err(|_| {
        ValidationError {
            interface: interface.into(),
            field,
            value: value.into(),
        }
        .into()
    })
}

pub fn broadcast_address(address: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(address.to_bits() | !netmask.to_bits())
}

pub fn network_address(address: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(address.to_bits() & netmask.to_bits())
}
