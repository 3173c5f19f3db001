use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use log::{debug, warn};
use tokio::runtime::Handle as RtHandle;

const DNS_PORT: u16 = 53;

pub trait DnsResolver: Send + Sync {
    fn lookup_host(&self, servers: &[String], host: &str) -> Result<String>;
}

/// Asks each nameserver in turn until one returns an address. Must not be
/// called from a runtime worker thread.
#[derive(Clone, Debug)]
pub struct HickoryDnsResolver {
    rt: RtHandle,
    timeout: Duration,
}

impl HickoryDnsResolver {
    pub fn new(rt: RtHandle, timeout: Duration) -> Self {
        Self { rt, timeout }
    }

    fn lookup_with_server(&self, server: &str, host: &str) -> Result<IpAddr> {
        let server_ip = server
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| anyhow!("invalid nameserver {:?}", server))?;
        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(&[server_ip], DNS_PORT, true),
        );
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        opts.use_hosts_file = false;

        self.rt.block_on(async {
            let resolver = TokioAsyncResolver::tokio(config, opts);
            let response = resolver.lookup_ip(host).await?;
            response
                .iter()
                .next()
                .ok_or_else(|| anyhow!("no address for {} from {}", host, server))
        })
    }
}

impl DnsResolver for HickoryDnsResolver {
    fn lookup_host(&self, servers: &[String], host: &str) -> Result<String> {
        if host == "localhost" {
            return Ok("127.0.0.1".into());
        }
        if host.parse::<IpAddr>().is_ok() {
            return Ok(host.into());
        }

        let mut last_error = None;
        for server in servers {
            match self.lookup_with_server(server, host) {
                Ok(ip) => {
                    debug!("Resolved {} to {} using {}", host, ip, server);
                    return Ok(ip.to_string());
                }
                Err(e) => {
                    warn!("Unable to resolve {} using {}: {}", host, server, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => anyhow!("unable to resolve {}: {}", host, e),
            None => anyhow!("unable to resolve {}: no nameservers given", host),
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tokio::runtime::Runtime;

    use super::*;

    fn servers() -> Vec<String> {
        vec!["10.0.0.2".into(), "10.0.0.3".into()]
    }

    #[test]
    fn test_lookup_host_without_query() {
        struct Case<'a> {
            host: &'a str,
            expected: &'a str,
        }
        let cases = [
            Case {
                host: "localhost",
                expected: "127.0.0.1",
            },
            Case {
                host: "10.1.2.3",
                expected: "10.1.2.3",
            },
            Case {
                host: "fd00::1",
                expected: "fd00::1",
            },
        ];
        let rt = Runtime::new().unwrap();
        let resolver = HickoryDnsResolver::new(rt.handle().clone(), Duration::from_secs(1));
        for case in cases {
            assert_eq!(resolver.lookup_host(&servers(), case.host).unwrap(), case.expected);
        }
    }

    #[test]
    fn test_lookup_host_failures() {
        struct Case<'a> {
            servers: Vec<String>,
            message: &'a str,
        }
        let cases = [
            Case {
                servers: vec![],
                message: "no nameservers given",
            },
            Case {
                servers: vec!["not-an-address".into(), "10.0.0.256".into()],
                message: "invalid nameserver \"10.0.0.256\"",
            },
        ];
        let rt = Runtime::new().unwrap();
        let resolver = HickoryDnsResolver::new(rt.handle().clone(), Duration::from_secs(1));
        for case in cases {
            let err = resolver
                .lookup_host(&case.servers, "registry.example")
                .unwrap_err();
            assert!(err.to_string().contains(case.message), "{}", err);
        }
    }
}
