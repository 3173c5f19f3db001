pub mod arp;
pub mod backoff;
pub mod config;
pub mod constants;
pub mod dns;
pub mod fs;
pub mod http;
pub mod ifconfig;
pub mod interface;
pub mod logger;
pub mod metadata;
pub mod net_manager;
mod netlink;
pub mod render;
pub mod settings;
pub mod system;

#[cfg(test)]
mod testing;
