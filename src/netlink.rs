use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Result, anyhow};
use futures::{Stream, StreamExt};
use netlink_packet_route::AddressFamily;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::{Error as NlError, Handle as NlHandle, new_connection};
use tokio::runtime::Handle as RtHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkInfo {
    pub(crate) name: String,
    pub(crate) ifindex: u32,
}

pub(crate) struct NetlinkConnection {
    handle: NlHandle,
}

impl NetlinkConnection {
    /// Must be called from within a tokio runtime, which drives the
    /// connection.
    pub(crate) fn new() -> Result<Self> {
        let rt = RtHandle::try_current().map_err(|_| anyhow!("tokio is not running"))?;
        let (connection, handle, _) =
            new_connection().map_err(|e| anyhow!("unable to create netlink socket: {}", e))?;
        rt.spawn(connection);
        Ok(Self { handle })
    }

    pub(crate) async fn get_links(&self) -> Result<Vec<LinkInfo>> {
        let mut links = Vec::new();
        let mut stream = self.handle.link().get().execute();
        while let Some(link_res) = stream.next().await {
            let link = link_res.map_err(|e| anyhow!("unable to list links: {}", e))?;
            links.push(extract_link(&link));
        }
        Ok(links)
    }

    pub(crate) fn address_stream(
        &self,
        ifindex: Option<u32>,
    ) -> impl Stream<Item = Result<AddressMessage, NlError>> {
        let mut req = self.handle.address().get();
        if let Some(i) = ifindex {
            req = req.set_link_index_filter(i);
        }
        req.execute()
    }

    pub(crate) async fn first_ipv4_address(&self, name: &str) -> Result<Ipv4Addr> {
        let link = self
            .get_links()
            .await?
            .into_iter()
            .find(|l| l.name == name)
            .ok_or_else(|| anyhow!("interface {} not found", name))?;

        let mut addrs = self.address_stream(Some(link.ifindex));
        while let Some(addr_res) = addrs.next().await {
            let addr_msg =
                addr_res.map_err(|e| anyhow!("unable to list addresses of {}: {}", name, e))?;
            if addr_msg.header.family != AddressFamily::Inet
                || addr_msg.header.index != link.ifindex
            {
                continue;
            }
            if let Some(address) = first_ipv4(&addr_msg) {
                return Ok(address);
            }
        }
        Err(anyhow!("no IPv4 address found on interface {}", name))
    }
}

fn extract_link(link: &LinkMessage) -> LinkInfo {
    let name = link
        .attributes
        .iter()
        .find_map(|nla| match nla {
            LinkAttribute::IfName(n) => Some(n.clone()),
            _ => None,
        })
        .unwrap_or_default();
    LinkInfo {
        name,
        ifindex: link.header.index,
    }
}

fn first_ipv4(message: &AddressMessage) -> Option<Ipv4Addr> {
    message.attributes.iter().find_map(|attr| match attr {
        AddressAttribute::Address(IpAddr::V4(v4)) => Some(*v4),
        _ => None,
    })
}
