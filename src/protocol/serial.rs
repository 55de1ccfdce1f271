//! ASRL (RS-232/RS-485) transport. Framing is generic (`crate::protocol::framing`);
//! everything else is delegated to `tokio_serial`, per SPEC_FULL.md §1: "Serial
//! transport is out of scope beyond its framing rules because it is a thin wrapper
//! over a third-party serial library."
//!
//! Grounded on `examples/farlepet-testeq-rs/src/protocol/scpi_serial.rs`, stripped of
//! its `ScpiProtocol`-specific methods and reduced to the plain [`Transport`] trait.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::{error::Result, transport::Transport};

pub struct SerialTransport {
    port_name: String,
    serial: SerialStream,
}
impl SerialTransport {
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        let serial = tokio_serial::new(port_name, baud)
            .open_native_async()
            .map_err(std::io::Error::from)?;
        Ok(Self {
            port_name: port_name.to_string(),
            serial,
        })
    }
}
#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.serial.write_all(data).await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.serial.read(buf).await?)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn peer_description(&self) -> String {
        format!("asrl://{}", self.port_name)
    }
}
