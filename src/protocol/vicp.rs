//! VICP (LeCroy/Teledyne's proprietary LAN protocol) transport.
//!
//! SPEC_FULL.md §6 treats VICP as "delegated to external library; treated as a TCP
//! transport whose framing is opaque" — this backend does not parse VICP's own
//! header, it only supplies the TCP byte pipe underneath it, same as for a raw
//! `SOCKET` resource. Grounded on the same `scpi_tcp.rs` connect logic as
//! [`crate::protocol::tcp_socket`]; kept as a distinct type so callers and the
//! session registry can still tell a VICP resource apart from a plain `SOCKET` one
//! for attribute/keep-alive purposes (SPEC_FULL.md S6).

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::{error::Result, protocol::tcp_socket::TcpSocketTransport, transport::Transport};

/// Default TCP port VICP instruments listen on.
pub const VICP_PORT: u16 = 1861;

pub struct VicpTransport(TcpSocketTransport);
impl VicpTransport {
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        Ok(Self(TcpSocketTransport::connect(peer).await?))
    }
}
#[async_trait]
impl Transport for VicpTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.0.write(data).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0.read(buf).await
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await
    }

    fn peer_description(&self) -> String {
        self.0.peer_description()
    }

    fn set_keep_alive(&mut self, enable: bool) -> Result<()> {
        self.0.set_keep_alive(enable)
    }
}
