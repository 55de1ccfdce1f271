//! Portmapper client (RFC1833) used to resolve the VXI-11 Device Core program to a
//! TCP port before the real connection is opened.
//!
//! Grounded on `examples/farlepet-testeq-rs/src/protocol/vxi11/portmap.rs`.

use std::{net::SocketAddr, time::Duration};

use crate::error::Result;

use super::{xdr::{self, XdrPack}, OncClient};

const PORTMAP_PROG: u32 = 100000;
const PORTMAP_VERS: u32 = 2;
pub const PORTMAP_PORT: u16 = 111;

#[allow(unused)]
#[repr(u32)]
enum PortmapProc {
    Null = 0,
    Set = 1,
    Unset = 2,
    GetPort = 3,
    CallIt = 4,
}

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
pub enum RpcIpProto {
    Tcp = 6,
    Udp = 17,
}

struct RpcMapping {
    prog: u32,
    vers: u32,
    prot: RpcIpProto,
    port: u32,
}
impl XdrPack for RpcMapping {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.prog.pack_xdr(out);
        self.vers.pack_xdr(out);
        (self.prot as u32).pack_xdr(out);
        self.port.pack_xdr(out);
    }
}

/// Connects fresh to a host's portmapper and asks which port serves `(prog, vers)`.
pub async fn connect_and_request_port(
    host: SocketAddr,
    prog: u32,
    vers: u32,
    prot: RpcIpProto,
    timeout: Duration,
) -> Result<u16> {
    let mut pmap_addr = host;
    pmap_addr.set_port(PORTMAP_PORT);

    let mut client = OncClient::new(pmap_addr);
    client.connect().await?;
    request_port(&mut client, prog, vers, prot, timeout).await
}

pub async fn request_port(
    client: &mut OncClient,
    prog: u32,
    vers: u32,
    prot: RpcIpProto,
    timeout: Duration,
) -> Result<u16> {
    let mapping = RpcMapping { prog, vers, prot, port: 0 };

    let mut result = client
        .call(PORTMAP_PROG, PORTMAP_VERS, PortmapProc::GetPort as u32, mapping, timeout)
        .await?;

    xdr::unpack_u16(&mut result)
}
