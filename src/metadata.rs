use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::backoff::RetryPolicy;
use crate::constants::{
    CACHE_FILE_PREFIX, DEFAULT_INSTANCE_ID_PATH, DEFAULT_INTERFACE, DEFAULT_METADATA_HOST,
    DEFAULT_SSH_KEYS_PATH, DEFAULT_USER_DATA_PATH, DIR_METADATA_CACHE,
};
use crate::dns::DnsResolver;
use crate::fs::FileSystem;
use crate::http::{HttpTransport, RetryClient};
use crate::net_manager::NetworkPlatform;
use crate::settings::{Network, Networks};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct MetadataConfig {
    pub host: String,
    pub headers: BTreeMap<String, String>,
    pub user_data_path: String,
    pub instance_id_path: String,
    pub ssh_keys_path: String,
    pub cache_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_METADATA_HOST.into(),
            headers: BTreeMap::new(),
            user_data_path: DEFAULT_USER_DATA_PATH.into(),
            instance_id_path: DEFAULT_INSTANCE_ID_PATH.into(),
            ssh_keys_path: DEFAULT_SSH_KEYS_PATH.into(),
            cache_dir: PathBuf::from(DIR_METADATA_CACHE),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserData {
    pub registry: RegistrySettings,
    pub server: ServerSettings,
    pub dns: DnsSettings,
    pub networks: Networks,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    pub endpoint: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DnsSettings {
    pub nameserver: Vec<String>,
}

pub struct HttpMetadataService {
    host: String,
    headers: Vec<(String, String)>,
    user_data_path: String,
    instance_id_path: String,
    ssh_keys_path: String,
    cache_dir: PathBuf,
    client: RetryClient,
    platform: Arc<dyn NetworkPlatform>,
    fs: Arc<dyn FileSystem>,
    dns_resolver: Arc<dyn DnsResolver>,
}

impl HttpMetadataService {
    pub fn new(
        config: &MetadataConfig,
        platform: Arc<dyn NetworkPlatform>,
        fs: Arc<dyn FileSystem>,
        dns_resolver: Arc<dyn DnsResolver>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            host: config.host.clone(),
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            user_data_path: config.user_data_path.clone(),
            instance_id_path: config.instance_id_path.clone(),
            ssh_keys_path: config.ssh_keys_path.clone(),
            cache_dir: config.cache_dir.clone(),
            client: RetryClient::new(transport, config.retry),
            platform,
            fs,
            dns_resolver,
        }
    }

    pub fn get_public_key(&self) -> Result<String> {
        if self.ssh_keys_path.is_empty() {
            return Ok(String::new());
        }
        let url = self.url(&self.ssh_keys_path);
        self.fetch_string(&url)
            .with_context(|| format!("unable to get OpenSSH key from {}", url))
    }

    pub fn get_instance_id(&self) -> Result<String> {
        if self.instance_id_path.is_empty() {
            return Ok(String::new());
        }
        let url = self.url(&self.instance_id_path);
        self.fetch_string(&url)
            .with_context(|| format!("unable to get instance ID from {}", url))
    }

    pub fn get_value_at_path(&self, path: &str) -> Result<String> {
        if path.is_empty() {
            return Err(anyhow!("unable to get metadata value for an empty path"));
        }
        let url = self.url(path);
        self.fetch_string(&url)
            .with_context(|| format!("unable to get value from {}", url))
    }

    pub fn get_server_name(&self) -> Result<String> {
        let user_data = self.get_user_data()?;
        if user_data.server.name.is_empty() {
            return Err(anyhow!("empty server name in user data"));
        }
        Ok(user_data.server.name)
    }

    pub fn get_registry_endpoint(&self) -> Result<String> {
        let user_data = self.get_user_data()?;
        let endpoint = user_data.registry.endpoint;
        let nameservers = user_data.dns.nameserver;
        if nameservers.is_empty() {
            return Ok(endpoint);
        }

        let resolved = self
            .resolve_endpoint(&endpoint, &nameservers)
            .context("unable to resolve registry endpoint")?;
        debug!("Registry endpoint {} resolved to {}", endpoint, resolved);
        Ok(resolved)
    }

    pub fn get_networks(&self) -> Result<Networks> {
        Ok(self.get_user_data()?.networks)
    }

    pub fn is_available(&self) -> bool {
        true
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn fetch_string(&self, url: &str) -> Result<String> {
        self.ensure_minimal_network_setup()?;
        let body = self.do_get(url)?;
        String::from_utf8(body).map_err(|e| anyhow!("unable to decode response: {}", e))
    }

    fn get_user_data(&self) -> Result<UserData> {
        self.ensure_minimal_network_setup()?;
        let url = self.url(&self.user_data_path);
        let body = self
            .do_get(&url)
            .with_context(|| format!("unable to get user data from {}", url))?;
        serde_json::from_slice(&body).map_err(|e| {
            anyhow!(
                "unable to parse user data {:?}: {}",
                String::from_utf8_lossy(&body),
                e
            )
        })
    }

    // Only the host part of a URL or `host:port` endpoint is replaced.
    fn resolve_endpoint(&self, endpoint: &str, nameservers: &[String]) -> Result<String> {
        if let Ok(mut url) = reqwest::Url::parse(endpoint)
            && let Some(host) = url.host_str().map(String::from)
        {
            let address = self.lookup_address(nameservers, &host)?;
            let added_slash = url.path() == "/"
                && url.query().is_none()
                && url.fragment().is_none()
                && !endpoint.ends_with('/');
            url.set_ip_host(address)
                .map_err(|_| anyhow!("unable to set host of {} to {}", endpoint, address))?;
            let mut resolved = String::from(url);
            if added_slash {
                resolved.pop();
            }
            return Ok(resolved);
        }

        if let Some((host, port)) = endpoint.rsplit_once(':')
            && let Ok(port) = port.parse::<u16>()
        {
            let address = self.lookup_address(nameservers, host)?;
            return Ok(SocketAddr::new(address, port).to_string());
        }
        Ok(self.lookup_address(nameservers, endpoint)?.to_string())
    }

    fn lookup_address(&self, nameservers: &[String], host: &str) -> Result<IpAddr> {
        let address = self.dns_resolver.lookup_host(nameservers, host)?;
        address
            .parse()
            .map_err(|_| anyhow!("{} resolved to {:?}, not an IP address", host, address))
    }

    // Only checks for existing configuration so that configuration passed to
    // the host some other way is never replaced.
    fn ensure_minimal_network_setup(&self) -> Result<()> {
        let configured = self
            .platform
            .configured_network_interfaces()
            .context("unable to get configured network interfaces")?;
        if !configured.is_empty() {
            return Ok(());
        }

        info!("No configured networks found, setting up DHCP on {}", DEFAULT_INTERFACE);
        let networks = Networks::from([(DEFAULT_INTERFACE.to_string(), Network::dynamic())]);
        self.platform
            .setup_networking(&networks, None)
            .context("unable to set up initial DHCP network")
    }

    fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}{:x}", CACHE_FILE_PREFIX, Sha1::digest(url.as_bytes())))
    }

    fn do_get(&self, url: &str) -> Result<Vec<u8>> {
        let cache_path = self.cache_path(url);
        if let Ok(cached) = self.fs.read_file(&cache_path) {
            debug!("Using cached response for {} from {:?}", url, cache_path);
            return Ok(cached);
        }

        let body = self.client.get(url, &self.headers)?;
        self.fs
            .write_file(&cache_path, &body)
            .context("unable to cache response body")?;
        Ok(body)
    }
}
