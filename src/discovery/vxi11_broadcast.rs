//! VXI-11 discovery: broadcasts a portmapper `GETPORT` call for program 395183 and
//! collects whichever hosts answer (SPEC_FULL.md §4.7).

use std::{net::SocketAddr, time::Duration};

use tokio::net::UdpSocket;

use crate::{
    error::Result,
    protocol::onc::{
        messages::{CallBody, MessageBody, OpaqueAuth, RpcMessage, RPC_VERSION},
        portmap::{PORTMAP_PORT, RpcIpProto},
        xdr::{self, XdrPack},
    },
    protocol::vxi11::{VxiLink, VXI_CORE_PROG, VXI_CORE_VERS},
    resource::{ResourceAddress, TcpipAddress, TcpipKind, DEFAULT_LAN_DEVICE_NAME},
};

use super::DiscoveredInstrument;

const GETPORT_PROC: u32 = 3;

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

/// Broadcasts a `GETPORT` request for the VXI-11 Device Core program and waits
/// `listen_for` for replies. When `query_idn` is set, each responder is briefly
/// connected to (`create_link` + `*IDN?`) before being reported.
pub async fn discover(listen_for: Duration, query_idn: bool) -> Result<Vec<DiscoveredInstrument>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    let xid = 1u32;
    let args = RpcMapping {
        prog: VXI_CORE_PROG,
        vers: VXI_CORE_VERS,
        prot: RpcIpProto::Udp,
        port: 0,
    };
    let mut packed_args = Vec::new();
    args.pack_xdr(&mut packed_args);

    let message = RpcMessage {
        xid,
        body: MessageBody::Call(CallBody {
            rpc_version: RPC_VERSION,
            prog: 100000, // portmapper
            vers: 2,
            proc: GETPORT_PROC,
            cred: OpaqueAuth::new_null(),
            verf: OpaqueAuth::new_null(),
            args: packed_args,
        }),
    };
    let mut payload = Vec::new();
    message.pack_xdr(&mut payload);

    let broadcast: SocketAddr = ([255, 255, 255, 255], PORTMAP_PORT).into();
    socket.send_to(&payload, broadcast).await?;

    let mut found = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + listen_for;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let (len, peer) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(res)) => res,
            _ => break,
        };

        let mut reply_bytes = buf[..len].to_vec();
        let Ok(reply) = RpcMessage::unpack(&mut reply_bytes) else {
            continue;
        };
        if reply.xid != xid {
            continue;
        }
        let Ok(mut result) = reply.into_success_result() else {
            continue;
        };
        let Ok(port) = xdr::unpack_u32(&mut result) else {
            continue;
        };
        if port == 0 {
            continue; // program not registered on this host
        }

        let address = ResourceAddress::Tcpip(TcpipAddress {
            board: 0,
            host: peer.ip().to_string(),
            kind: TcpipKind::Instr {
                lan_device_name: DEFAULT_LAN_DEVICE_NAME.to_string(),
            },
        });

        let idn = if query_idn {
            query_idn_string(peer, listen_for).await.ok()
        } else {
            None
        };

        found.push(DiscoveredInstrument { resource: address, idn });
    }

    Ok(found)
}

async fn query_idn_string(peer: SocketAddr, timeout: Duration) -> Result<String> {
    let link = VxiLink::open(peer, DEFAULT_LAN_DEVICE_NAME, timeout).await?;
    link.write(b"*IDN?\n", timeout).await?;
    let (data, _) = link.read(256, Some(b'\n'), timeout).await?;
    link.destroy_link().await?;
    Ok(String::from_utf8_lossy(&data).trim().to_string())
}
