use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::constants::{
    CMD_SERVICE, DIR_ETC_DHCP, DIR_NETWORK_SCRIPTS, FILE_DHCLIENT_CONF,
    FILE_ETC_NETWORK_INTERFACES,
};
use crate::fs::FileSystem;
use crate::ifconfig::{DhcpInterfaceConfiguration, StaticInterfaceConfiguration};

const DHCLIENT_CONF_BASE: &str = "# Generated by bosh-agent

option rfc3442-classless-static-routes code 121 = array of unsigned integer 8;

send host-name \"<hostname>\";

request subnet-mask, broadcast-address, time-offset, routers,
\tdomain-name, domain-name-servers, domain-search, host-name,
\tnetbios-name-servers, netbios-scope, interface-mtu,
\trfc3442-classless-static-routes, ntp-servers;

";

#[derive(Clone, Debug, Default)]
pub struct RenderInput {
    pub statics: Vec<StaticInterfaceConfiguration>,
    pub dhcps: Vec<DhcpInterfaceConfiguration>,
    pub dns_servers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    File { path: PathBuf, contents: String },
    Symlink { path: PathBuf, target: PathBuf },
}

impl Artifact {
    pub fn path(&self) -> &Path {
        match self {
            Artifact::File { path, .. } => path,
            Artifact::Symlink { path, .. } => path,
        }
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, input: &RenderInput) -> Vec<Artifact>;

    fn restart_command(&self) -> (&'static str, &'static [&'static str]);

    fn is_configured(&self, fs: &dyn FileSystem, interface: &str) -> Result<bool>;
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Centos,
    Ubuntu,
}

impl Platform {
    pub fn renderer(&self) -> Box<dyn Renderer> {
        match self {
            Platform::Centos => Box::new(CentosRenderer),
            Platform::Ubuntu => Box::new(UbuntuRenderer),
        }
    }
}

pub fn dhclient_config(dns_servers: &[String]) -> String {
    let mut contents = DHCLIENT_CONF_BASE.to_string();
    if !dns_servers.is_empty() {
        contents.push_str(&format!(
            "prepend domain-name-servers {};\n",
            dns_servers.join(", ")
        ));
    }
    contents
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CentosRenderer;

impl CentosRenderer {
    pub fn ifcfg_path(interface: &str) -> PathBuf {
        Path::new(DIR_NETWORK_SCRIPTS).join(format!("ifcfg-{}", interface))
    }

    pub fn dhclient_link_path(interface: &str) -> PathBuf {
        Path::new(DIR_ETC_DHCP).join(format!("dhclient-{}.conf", interface))
    }

    fn static_ifcfg(config: &StaticInterfaceConfiguration, dns_servers: &[String]) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "DEVICE={}", config.name);
        let _ = writeln!(s, "BOOTPROTO=static");
        let _ = writeln!(s, "IPADDR={}", config.address);
        let _ = writeln!(s, "NETMASK={}", config.netmask);
        let _ = writeln!(s, "BROADCAST={}", config.broadcast);
        if let Some(gateway) = config.gateway {
            let _ = writeln!(s, "GATEWAY={}", gateway);
        }
        let _ = writeln!(s, "ONBOOT=yes");
        let _ = writeln!(s, "NM_CONTROLLED=no");
        let _ = writeln!(s, "PEERDNS=no");
        for (i, server) in dns_servers.iter().take(2).enumerate() {
            let _ = writeln!(s, "DNS{}={}", i + 1, server);
        }
        s
    }

    fn dhcp_ifcfg(config: &DhcpInterfaceConfiguration) -> String {
        format!(
            "DEVICE={}\nBOOTPROTO=dhcp\nONBOOT=yes\nPEERDNS=yes\n",
            config.name
        )
    }
}

impl Renderer for CentosRenderer {
    fn render(&self, input: &RenderInput) -> Vec<Artifact> {
        let mut artifacts = Vec::new();
        for config in &input.statics {
            artifacts.push(Artifact::File {
                path: Self::ifcfg_path(&config.name),
                contents: Self::static_ifcfg(config, &input.dns_servers),
            });
        }
        for config in &input.dhcps {
            artifacts.push(Artifact::File {
                path: Self::ifcfg_path(&config.name),
                contents: Self::dhcp_ifcfg(config),
            });
        }
        if !input.dhcps.is_empty() {
            artifacts.push(Artifact::File {
                path: PathBuf::from(FILE_DHCLIENT_CONF),
                contents: dhclient_config(&input.dns_servers),
            });
            for config in &input.dhcps {
                artifacts.push(Artifact::Symlink {
                    path: Self::dhclient_link_path(&config.name),
                    target: PathBuf::from(FILE_DHCLIENT_CONF),
                });
            }
        }
        artifacts
    }

    fn restart_command(&self) -> (&'static str, &'static [&'static str]) {
        (CMD_SERVICE, &["network", "restart"])
    }

    fn is_configured(&self, fs: &dyn FileSystem, interface: &str) -> Result<bool> {
        Ok(fs.exists(&Self::ifcfg_path(interface)))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UbuntuRenderer;

impl UbuntuRenderer {
    fn interfaces_file(input: &RenderInput) -> String {
        let mut s = String::from("# Generated by bosh-agent\nauto lo\niface lo inet loopback\n");
        for config in &input.dhcps {
            let _ = write!(
                s,
                "\nauto {name}\niface {name} inet dhcp\n",
                name = config.name
            );
        }
        for config in &input.statics {
            let _ = write!(
                s,
                "\nauto {name}\niface {name} inet static\n    address {}\n    network {}\n    netmask {}\n    broadcast {}\n",
                config.address,
                config.network,
                config.netmask,
                config.broadcast,
                name = config.name,
            );
            if let Some(gateway) = config.gateway {
                let _ = writeln!(s, "    gateway {}", gateway);
            }
        }
        if !input.dns_servers.is_empty() {
            let _ = writeln!(s, "\ndns-nameservers {}", input.dns_servers.join(" "));
        }
        s
    }
}

impl Renderer for UbuntuRenderer {
    fn render(&self, input: &RenderInput) -> Vec<Artifact> {
        let mut artifacts = vec![Artifact::File {
            path: PathBuf::from(FILE_ETC_NETWORK_INTERFACES),
            contents: Self::interfaces_file(input),
        }];
        if !input.dhcps.is_empty() {
            artifacts.push(Artifact::File {
                path: PathBuf::from(FILE_DHCLIENT_CONF),
                contents: dhclient_config(&input.dns_servers),
            });
        }
        artifacts
    }

    fn restart_command(&self) -> (&'static str, &'static [&'static str]) {
        (CMD_SERVICE, &["networking", "restart"])
    }

    fn is_configured(&self, fs: &dyn FileSystem, interface: &str) -> Result<bool> {
        let path = Path::new(FILE_ETC_NETWORK_INTERFACES);
        if !fs.exists(path) {
            return Ok(false);
        }
        let contents = fs
            .read_file_string(path)
            .map_err(|e| anyhow!("unable to check configuration of {}: {}", interface, e))?;
        Ok(contents.lines().any(|line| {
            let mut fields = line.split_whitespace();
            fields.next() == Some("iface") && fields.next() == Some(interface)
        }))
    }
}
