//! Capability traits that separate protocol engines from the hardware/OS calls that
//! carry their bytes. Every engine in `crate::protocol` is written against these
//! traits, never against `tokio::net::TcpStream`/`rusb`/`tokio_serial` directly, so
//! engines can be driven in tests by an in-memory fake (SPEC_FULL.md §4.5, §4.6, §9).
//!
//! Grounded on the teacher's own `Protocol` trait
//! (`examples/farlepet-testeq-rs/src/protocol/mod.rs`) generalized one layer down:
//! that trait mixed "how do I talk to the wire" with "what does this instrument mean",
//! this one keeps only the former.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A byte-stream transport: TCP (VXI-11, HiSLIP, VICP, raw SOCKET) or serial.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Reads up to `buf.len()` bytes, returning the number actually read.
    /// Like `AsyncRead::read`, zero means EOF/closed, never "nothing arrived yet".
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    async fn close(&mut self) -> Result<()>;

    /// Best-effort peer description for log messages and error text.
    fn peer_description(&self) -> String;

    /// Enables/disables SO_KEEPALIVE on the underlying socket, for the
    /// `TCPIP_KEEPALIVE` attribute (SPEC_FULL.md §4.8, S6). Transports with no
    /// underlying socket (serial) report `NotSupported`.
    fn set_keep_alive(&mut self, _enable: bool) -> Result<()> {
        Err(crate::error::Error::NotSupported(
            "this transport has no socket to set SO_KEEPALIVE on".into(),
        ))
    }
}

/// USBTMC/USB488 bulk and control transfers (SPEC_FULL.md §4.5).
#[async_trait]
pub trait UsbTransport: Send + Sync {
    async fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    async fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    async fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize>;

    async fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize>;

    /// Reads one byte off the device's interrupt-IN endpoint, if it has one, used for
    /// the asynchronous half of READ_STATUS_BYTE.
    async fn interrupt_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn serial_number(&self) -> &str;
}

/// A GPIB controller-in-charge interface (SPEC_FULL.md §4.6). One instance talks to
/// the board, addressing whichever device is named in each call.
#[async_trait]
pub trait GpibTransport: Send + Sync {
    async fn write(&mut self, primary: u8, secondary: Option<u8>, data: &[u8], eoi: bool) -> Result<usize>;

    async fn read(&mut self, primary: u8, secondary: Option<u8>, buf: &mut [u8]) -> Result<(usize, bool)>;

    /// Sends the Selected Device Clear message.
    async fn clear(&mut self, primary: u8, secondary: Option<u8>) -> Result<()>;

    /// Sends the Group Execute Trigger message.
    async fn trigger(&mut self, primary: u8, secondary: Option<u8>) -> Result<()>;

    /// Serial poll: addresses the device as talker and reads one status byte.
    async fn serial_poll(&mut self, primary: u8, secondary: Option<u8>) -> Result<u8>;

    /// Lists primary addresses that currently assert the GPIB listener state, used
    /// by bus discovery (SPEC_FULL.md §4.6, property 8).
    async fn find_listeners(&mut self) -> Result<Vec<u8>>;
}

// Blanket forwarding impls so `Session` can hold `Box<dyn UsbTransport>`/
// `Box<dyn GpibTransport>` as the concrete type parameter the engines in
// `crate::protocol::{usbtmc, gpib}` are generic over, instead of needing a second,
// object-safe copy of each trait.

#[async_trait]
impl UsbTransport for Box<dyn UsbTransport> {
    async fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_out(endpoint, data, timeout).await
    }
    async fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_in(endpoint, buf, timeout).await
    }
    async fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        (**self).control_in(request_type, request, value, index, buf, timeout).await
    }
    async fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        (**self).control_out(request_type, request, value, index, data, timeout).await
    }
    async fn interrupt_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).interrupt_in(endpoint, buf, timeout).await
    }
    fn vendor_id(&self) -> u16 {
        (**self).vendor_id()
    }
    fn product_id(&self) -> u16 {
        (**self).product_id()
    }
    fn serial_number(&self) -> &str {
        (**self).serial_number()
    }
}

#[async_trait]
impl GpibTransport for Box<dyn GpibTransport> {
    async fn write(&mut self, primary: u8, secondary: Option<u8>, data: &[u8], eoi: bool) -> Result<usize> {
        (**self).write(primary, secondary, data, eoi).await
    }
    async fn read(&mut self, primary: u8, secondary: Option<u8>, buf: &mut [u8]) -> Result<(usize, bool)> {
        (**self).read(primary, secondary, buf).await
    }
    async fn clear(&mut self, primary: u8, secondary: Option<u8>) -> Result<()> {
        (**self).clear(primary, secondary).await
    }
    async fn trigger(&mut self, primary: u8, secondary: Option<u8>) -> Result<()> {
        (**self).trigger(primary, secondary).await
    }
    async fn serial_poll(&mut self, primary: u8, secondary: Option<u8>) -> Result<u8> {
        (**self).serial_poll(primary, secondary).await
    }
    async fn find_listeners(&mut self) -> Result<Vec<u8>> {
        (**self).find_listeners().await
    }
}
