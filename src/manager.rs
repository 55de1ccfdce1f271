//! `ResourceManager`: owns the resource-string → [`Session`] map SPEC_FULL.md §4.8
//! calls for, with no process-wide globals (§9 "Global mutable state").
//!
//! There is no teacher precedent for a manager like this; the explicit
//! owning-struct-over-hidden-statics shape follows the same instinct as the
//! `ResourceManager`/`Session` split surveyed in
//! `other_examples/6f3a7660_caliangroup-libvisa__src-session.rs.rs`, adapted to five
//! transport families instead of one.

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use tokio::net::lookup_host;

use crate::{
    attribute::AttributeTarget,
    error::{Error, Result},
    protocol::{
        hislip::HiSlipLink,
        tcp_socket::TcpSocketTransport,
        vicp::{self, VicpTransport},
        vxi11::VxiLink,
    },
    quirks,
    resource::{AccessMode, OpenOptions, ResourceAddress, TcpipKind},
    session::{Engine, Session},
    transport::Transport,
};

#[cfg(feature = "usb")]
use crate::transport::UsbTransport;

#[cfg(feature = "serial")]
use crate::protocol::serial::SerialTransport;

/// Default HiSLIP port (SPEC_FULL.md §4.4, §6).
pub const HISLIP_PORT: u16 = 4880;

/// Opaque handle returned by `open`, used for every later call against that session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

pub struct ResourceManager {
    sessions: HashMap<u64, Session>,
    next_handle: u64,
}
impl ResourceManager {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Resolves `resource_string`, connects the matching engine, and applies
    /// `options` before returning a handle (SPEC_FULL.md §3, §6 `open`).
    pub async fn open(&mut self, resource_string: &str, options: OpenOptions) -> Result<SessionHandle> {
        let address = ResourceAddress::parse(resource_string)?;
        let engine = self.connect_engine(&address, options.open_timeout).await?;
        let quirks = quirks::lookup(0, 0, None);

        let mut session = Session::new(engine, address, quirks);
        session.set_attribute(crate::attribute::AttributeValue::SendEnd(options.send_end))?;
        session.set_attribute(crate::attribute::AttributeValue::SuppressEndOnRead(options.suppress_end))?;
        if let Some(term_char) = options.term_char {
            session.set_attribute(crate::attribute::AttributeValue::TermChar(Some(term_char)))?;
        }

        match &options.access_mode {
            AccessMode::NoLock => {}
            AccessMode::ExclusiveLock => session.lock(true, None, false).await?,
            AccessMode::SharedLock { requested_key } => {
                session.lock(false, requested_key.clone(), false).await?
            }
        }

        let handle = SessionHandle(self.next_handle);
        self.next_handle += 1;
        self.sessions.insert(handle.0, session);
        Ok(handle)
    }

    /// Lets an embedding application hand in a live GPIB driver and/or a USB
    /// transport constructed outside this crate (e.g. a fake for testing, or a
    /// platform GPIB driver this crate has no way to discover itself; SPEC_FULL.md
    /// §4.6 notes there is no safe async GPIB crate to ground a built-in one on).
    pub fn open_with_transport(&mut self, address: ResourceAddress, engine: Engine, options: OpenOptions) -> Result<SessionHandle> {
        let quirks = quirks::lookup(0, 0, None);
        let mut session = Session::new(engine, address, quirks);
        session.set_attribute(crate::attribute::AttributeValue::SendEnd(options.send_end))?;
        session.set_attribute(crate::attribute::AttributeValue::SuppressEndOnRead(options.suppress_end))?;
        if let Some(term_char) = options.term_char {
            session.set_attribute(crate::attribute::AttributeValue::TermChar(Some(term_char)))?;
        }

        let handle = SessionHandle(self.next_handle);
        self.next_handle += 1;
        self.sessions.insert(handle.0, session);
        Ok(handle)
    }

    /// `list_resources` (SPEC_FULL.md §6): VXI-11 broadcast plus, when the `mdns`
    /// feature is compiled in, an mDNS browse for HiSLIP and LXI/VICP. `query` is
    /// unused beyond selecting which sweeps to run; this backend does not implement
    /// the VISA wildcard-expression match over the combined results itself.
    pub async fn list_resources(&self, listen_for: Duration) -> Result<Vec<String>> {
        let mut found = Vec::new();

        let vxi11 = crate::discovery::vxi11_broadcast::discover(listen_for, false).await?;
        found.extend(vxi11.into_iter().map(|d| d.resource.to_string()));

        #[cfg(feature = "mdns")]
        {
            for (service, key) in [
                (crate::discovery::mdns::HISLIP_SERVICE_TYPE, "device"),
                (crate::discovery::mdns::LXI_SERVICE_TYPE, "device"),
            ] {
                if let Ok(instruments) = crate::discovery::mdns::browse(service, listen_for, key).await {
                    found.extend(instruments.into_iter().map(|d| d.resource.to_string()));
                }
            }
        }

        Ok(found)
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Result<&mut Session> {
        self.sessions
            .get_mut(&handle.0)
            .ok_or_else(|| Error::ResourceNotFound(format!("no open session for handle {}", handle.0)))
    }

    /// Releases the server-side lock/auxiliary channels and forgets the session
    /// (SPEC_FULL.md §3 lifecycle).
    pub async fn close(&mut self, handle: SessionHandle) -> Result<()> {
        let session = self
            .sessions
            .remove(&handle.0)
            .ok_or_else(|| Error::ResourceNotFound(format!("no open session for handle {}", handle.0)))?;
        session.close().await
    }

    async fn connect_engine(&self, address: &ResourceAddress, open_timeout: Duration) -> Result<Engine> {
        match address {
            ResourceAddress::Tcpip(tcpip) => match &tcpip.kind {
                TcpipKind::Socket { port } => {
                    let peer = resolve(&tcpip.host, *port).await?;
                    let transport = TcpSocketTransport::connect(peer).await?;
                    Ok(Engine::Raw(Box::new(transport)))
                }
                TcpipKind::Instr { lan_device_name } if tcpip.is_hislip() => {
                    let peer = resolve(&tcpip.host, HISLIP_PORT).await?;
                    let sync: Box<dyn Transport> = Box::new(TcpSocketTransport::connect(peer).await?);
                    let async_chan: Box<dyn Transport> = Box::new(TcpSocketTransport::connect(peer).await?);
                    let link = HiSlipLink::open(sync, async_chan, lan_device_name, 0xFFFF).await?;
                    Ok(Engine::HiSlip(link))
                }
                TcpipKind::Instr { lan_device_name } => {
                    if probes_as_vicp(&tcpip.host, open_timeout).await {
                        let peer = resolve(&tcpip.host, vicp::VICP_PORT).await?;
                        let transport = VicpTransport::connect(peer).await?;
                        Ok(Engine::Raw(Box::new(transport)))
                    } else {
                        let peer = resolve(&tcpip.host, 0).await?;
                        let link = VxiLink::open(peer, lan_device_name, open_timeout).await?;
                        Ok(Engine::Vxi11(link))
                    }
                }
            },
            ResourceAddress::Usb(usb) => self.connect_usb(usb),
            ResourceAddress::Gpib(_) => Err(Error::NotSupported(
                "no built-in GPIB driver; use ResourceManager::open_with_transport with a platform driver".into(),
            )),
            ResourceAddress::Asrl(asrl) => self.connect_serial(&asrl.board),
        }
    }

    #[cfg(feature = "usb")]
    fn connect_usb(&self, usb: &crate::resource::UsbAddress) -> Result<Engine> {
        use crate::protocol::usbtmc::{rusb_transport::RusbTransport, UsbTmcLink};

        let interface = usb.interface.unwrap_or(0);
        let quirks = quirks::lookup(usb.vendor_id, usb.product_id, None);
        let transport = RusbTransport::open(usb.vendor_id, usb.product_id, &usb.serial, interface, quirks)?;
        let bulk_out = transport.bulk_out_endpoint();
        let bulk_in = transport.bulk_in_endpoint();
        let interrupt_in = transport.interrupt_in_endpoint();
        let max_packet = transport.bulk_in_max_packet();

        let boxed: Box<dyn UsbTransport> = Box::new(transport);
        let link = UsbTmcLink::new(boxed, bulk_out, bulk_in, interrupt_in, max_packet, quirks);
        Ok(Engine::UsbTmc(link))
    }

    #[cfg(not(feature = "usb"))]
    fn connect_usb(&self, _usb: &crate::resource::UsbAddress) -> Result<Engine> {
        Err(Error::ResourceNotFound("the \"usb\" feature is not compiled in".into()))
    }

    #[cfg(feature = "serial")]
    fn connect_serial(&self, board: &str) -> Result<Engine> {
        let transport = SerialTransport::open(board, 9600)?;
        Ok(Engine::Raw(Box::new(transport)))
    }

    #[cfg(not(feature = "serial"))]
    fn connect_serial(&self, _board: &str) -> Result<Engine> {
        Err(Error::ResourceNotFound("the \"serial\" feature is not compiled in".into()))
    }
}
impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(addr, port));
    }
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::ResourceNotFound(format!("could not resolve host \"{host}\"")))
}

/// A bare TCP connect to the VICP port distinguishes a VICP instrument from a
/// VXI-11 one on a plain `TCPIP[board]::host::INSTR` resource string
/// (SPEC_FULL.md §3: "resolved as VICP when host answers on the VICP port").
async fn probes_as_vicp(host: &str, timeout: Duration) -> bool {
    let Ok(peer) = resolve(host, vicp::VICP_PORT).await else {
        return false;
    };
    tokio::time::timeout(timeout, tokio::net::TcpStream::connect(peer))
        .await
        .is_ok_and(|res| res.is_ok())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handle_is_not_reused_after_close() {
        let mut manager = ResourceManager::new();
        manager.next_handle = 5;
        let a = SessionHandle(manager.next_handle);
        manager.next_handle += 1;
        let b = SessionHandle(manager.next_handle);
        assert_ne!(a, b);
    }
}
