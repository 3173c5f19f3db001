use std::collections::BTreeMap;

use serde::Deserialize;

pub const DEFAULT_DNS: &str = "dns";

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub enum NetworkType {
    #[default]
    Manual,
    Dynamic,
    Vip,
}

// Anything that is not "dynamic" or "vip", including an empty type, is a
// manually configured network.
impl From<String> for NetworkType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "dynamic" => NetworkType::Dynamic,
            "vip" => NetworkType::Vip,
            _ => NetworkType::Manual,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Network {
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    pub mac: String,
    pub dns: Vec<String>,
    pub default: Vec<String>,
}

impl Network {
    pub fn dynamic() -> Self {
        Self {
            network_type: NetworkType::Dynamic,
            ..Default::default()
        }
    }

    pub fn is_vip(&self) -> bool {
        self.network_type == NetworkType::Vip
    }

    pub fn is_default_for(&self, category: &str) -> bool {
        self.default.iter().any(|d| d == category)
    }

    pub fn has_mac(&self) -> bool {
        !self.mac.trim().is_empty()
    }
}

pub type Networks = BTreeMap<String, Network>;

pub trait NetworksExt {
    fn without_vips(&self) -> Networks;
}

impl NetworksExt for Networks {
    fn without_vips(&self) -> Networks {
        self.iter()
            .filter(|(_, network)| !network.is_vip())
            .map(|(name, network)| (name.clone(), network.clone()))
            .collect()
    }
}
