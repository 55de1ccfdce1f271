//! Raw `TCPIP::host::port::SOCKET` transport: a plain TCP stream with no protocol
//! framing at all beyond what the caller's read termination settings impose.
//!
//! Grounded on `examples/farlepet-testeq-rs/src/protocol/scpi_tcp.rs`, generalized
//! from a `ScpiProtocol` impl (which baked in `\n`-terminated line reads) down to the
//! plain [`Transport`] trait so the read-termination policy lives in
//! `crate::protocol::framing` instead of being hardcoded here.

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::SockRef;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpSocket, TcpStream},
};

use crate::{error::Result, transport::Transport};

pub struct TcpSocketTransport {
    stream: TcpStream,
    peer: SocketAddr,
}
impl TcpSocketTransport {
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        let socket = if peer.is_ipv6() {
            TcpSocket::new_v6()
        } else {
            TcpSocket::new_v4()
        }?;
        let stream = socket.connect(peer).await?;
        Ok(Self { stream, peer })
    }

}
#[async_trait]
impl Transport for TcpSocketTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf).await?)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn peer_description(&self) -> String {
        format!("tcp://{}", self.peer)
    }

    fn set_keep_alive(&mut self, enable: bool) -> Result<()> {
        SockRef::from(&self.stream).set_keepalive(enable)?;
        Ok(())
    }
}
