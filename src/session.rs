//! `Session`: the per-engine VISA operation surface [`crate::manager::ResourceManager`]
//! hands back from `open` (SPEC_FULL.md §3, §4.8).
//!
//! There is no teacher precedent for a single type spanning five unrelated wire
//! protocols; the shape here is an `Engine` enum dispatched from one struct that
//! carries the session-wide attributes (timeout, term-char, send-end, ...) common to
//! all of them, rather than duplicating those fields once per protocol struct.

use std::time::Duration;

use crate::{
    attribute::{unsupported, AttributeKind, AttributeTarget, AttributeValue, IoProtocol},
    error::{Error, Result},
    protocol::{framing, gpib::GpibLink, hislip::HiSlipLink, usbtmc::UsbTmcLink, vxi11::VxiLink},
    quirks::QuirkFlags,
    resource::ResourceAddress,
    status::CompletionReason,
    transport::{GpibTransport, Transport, UsbTransport},
};

/// Which wire protocol is backing this session. Constructed by
/// `crate::manager::ResourceManager::open`; callers interact only with [`Session`].
pub enum Engine {
    Vxi11(VxiLink),
    HiSlip(HiSlipLink),
    UsbTmc(UsbTmcLink<Box<dyn UsbTransport>>),
    Gpib(GpibLink<Box<dyn GpibTransport>>),
    /// Raw `TCPIP::SOCKET`, VICP, and ASRL: a plain byte stream framed only by
    /// `crate::protocol::framing::read_until`.
    Raw(Box<dyn Transport>),
}

/// Exclusive/shared device lock state (SPEC_FULL.md §3). VXI-11 also asks the
/// server to hold the lock; the other transports only track it locally, since
/// there is no wire-level lock primitive to ask for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LockState {
    #[default]
    Unlocked,
    Exclusive,
    Shared(String),
}

pub struct Session {
    engine: Engine,
    resource: ResourceAddress,
    timeout: Duration,
    term_char: Option<u8>,
    send_end: bool,
    suppress_end: bool,
    io_protocol: IoProtocol,
    keep_alive: bool,
    quirks: QuirkFlags,
    lock_state: LockState,
}
impl Session {
    pub(crate) fn new(engine: Engine, resource: ResourceAddress, quirks: QuirkFlags) -> Self {
        Self {
            engine,
            resource,
            timeout: Duration::from_secs(2),
            term_char: None,
            send_end: true,
            suppress_end: false,
            io_protocol: IoProtocol::Normal,
            keep_alive: false,
            quirks,
            lock_state: LockState::Unlocked,
        }
    }

    pub fn resource(&self) -> &ResourceAddress {
        &self.resource
    }

    pub fn quirks(&self) -> QuirkFlags {
        self.quirks
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.engine {
            Engine::Vxi11(link) => {
                link.write(data, self.timeout).await?;
                Ok(data.len())
            }
            Engine::HiSlip(link) => {
                link.write(data, self.send_end).await?;
                Ok(data.len())
            }
            Engine::UsbTmc(link) => {
                link.write(data, self.send_end, self.timeout).await?;
                Ok(data.len())
            }
            Engine::Gpib(link) => link.write(data, self.send_end).await,
            Engine::Raw(transport) => {
                transport.write(data).await?;
                Ok(data.len())
            }
        }
    }

    /// Reads up to `max_len` bytes. When `suppress_end` is set, a transport-level END
    /// indicator is ignored (the read continues) and only term-char or max-count end
    /// the message, per SPEC_FULL.md §9's resolved open question.
    pub async fn read(&mut self, max_len: usize) -> Result<(Vec<u8>, CompletionReason)> {
        let mut collected = Vec::new();
        loop {
            let remaining = max_len - collected.len();
            let (chunk, reason) = self.read_once(remaining).await.map_err(|e| match e {
                Error::Timeout { message, partial } => {
                    collected.extend(partial);
                    Error::timeout_with_partial(message, collected.clone())
                }
                other => other,
            })?;
            collected.extend(chunk);

            let stop_on_end = reason != CompletionReason::End || !self.suppress_end;
            if stop_on_end || collected.len() >= max_len {
                let reason = if collected.len() >= max_len && reason == CompletionReason::End && self.suppress_end {
                    CompletionReason::MaxCount
                } else {
                    reason
                };
                return Ok((collected, reason));
            }
        }
    }

    async fn read_once(&mut self, max_len: usize) -> Result<(Vec<u8>, CompletionReason)> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.read(max_len, self.term_char, self.timeout).await,
            Engine::HiSlip(link) => link.read(max_len, self.term_char, self.timeout).await,
            Engine::UsbTmc(link) => link.read(max_len, self.term_char, self.timeout).await,
            Engine::Gpib(link) => {
                let mut buf = vec![0u8; max_len];
                let (n, reason) = link.read(&mut buf).await?;
                buf.truncate(n);
                // GpibTransport only reports EOI; term-char matching happens here.
                if let Some(tc) = self.term_char {
                    if let Some(pos) = buf.iter().position(|&b| b == tc) {
                        buf.truncate(pos + 1);
                        return Ok((buf, CompletionReason::TermChar));
                    }
                }
                Ok((buf, reason))
            }
            Engine::Raw(transport) => {
                let deadline = tokio::time::Instant::now() + self.timeout;
                framing::read_until(transport.as_mut(), max_len, self.term_char, deadline).await
            }
        }
    }

    pub async fn read_stb(&mut self) -> Result<u8> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.device_readstb().await,
            Engine::HiSlip(link) => link.read_stb(self.timeout).await,
            Engine::UsbTmc(link) => link.read_status_byte(self.timeout).await,
            Engine::Gpib(link) => link.read_stb().await,
            Engine::Raw(_) => Err(Error::NotSupported("read_stb has no raw-socket equivalent".into())),
        }
    }

    pub async fn clear(&mut self) -> Result<()> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.device_clear().await,
            Engine::HiSlip(link) => link.device_clear().await,
            Engine::Gpib(link) => link.clear().await,
            Engine::UsbTmc(_) | Engine::Raw(_) => Ok(()),
        }
    }

    pub async fn assert_trigger(&mut self) -> Result<()> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.device_trigger().await,
            Engine::HiSlip(link) => link.trigger().await,
            Engine::Gpib(link) => link.trigger().await,
            Engine::UsbTmc(_) | Engine::Raw(_) => {
                Err(Error::NotSupported("this transport has no trigger message".into()))
            }
        }
    }

    /// `lock_type` is `None` for shared/no-key, `Some(key)` for a specific shared key.
    pub async fn lock(&mut self, exclusive: bool, requested_key: Option<String>, wait: bool) -> Result<()> {
        if let Engine::Vxi11(link) = &mut self.engine {
            link.device_lock(wait).await?;
        }
        self.lock_state = if exclusive {
            LockState::Exclusive
        } else {
            LockState::Shared(requested_key.unwrap_or_default())
        };
        Ok(())
    }

    pub async fn unlock(&mut self) -> Result<()> {
        if let Engine::Vxi11(link) = &mut self.engine {
            link.device_unlock().await?;
        }
        self.lock_state = LockState::Unlocked;
        Ok(())
    }

    /// `flush(mask)`: this backend keeps no read/write buffering above the engine
    /// layer, so there is nothing to discard; provided for API-contract completeness
    /// (SPEC_FULL.md §6).
    pub async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    pub async fn go_local(&mut self) -> Result<()> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.device_local().await,
            _ => Err(Error::NotSupported("only VXI-11 exposes device_local".into())),
        }
    }

    pub async fn go_remote(&mut self) -> Result<()> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.device_remote().await,
            _ => Err(Error::NotSupported("only VXI-11 exposes device_remote".into())),
        }
    }

    /// Closes the session, releasing any server-side lock and auxiliary channels
    /// (SPEC_FULL.md §3 lifecycle).
    pub async fn close(mut self) -> Result<()> {
        if self.lock_state != LockState::Unlocked {
            let _ = self.unlock().await;
        }
        match self.engine {
            Engine::Vxi11(link) => link.destroy_link().await,
            Engine::Raw(mut transport) => transport.close().await,
            Engine::HiSlip(_) | Engine::UsbTmc(_) | Engine::Gpib(_) => Ok(()),
        }
    }
}
impl AttributeTarget for Session {
    fn get_attribute(&self, kind: AttributeKind) -> Result<AttributeValue> {
        match kind {
            AttributeKind::Timeout => Ok(AttributeValue::Timeout(self.timeout)),
            AttributeKind::TermChar => Ok(AttributeValue::TermChar(self.term_char)),
            AttributeKind::SendEnd => Ok(AttributeValue::SendEnd(self.send_end)),
            AttributeKind::SuppressEndOnRead => Ok(AttributeValue::SuppressEndOnRead(self.suppress_end)),
            AttributeKind::IoProtocol => {
                let protocol = match &self.engine {
                    Engine::Vxi11(_) => IoProtocol::Vxi11,
                    Engine::HiSlip(_) => IoProtocol::Hislip,
                    Engine::UsbTmc(_) | Engine::Gpib(_) | Engine::Raw(_) => self.io_protocol,
                };
                Ok(AttributeValue::IoProtocol(protocol))
            }
            AttributeKind::KeepAlive => {
                if matches!(self.engine, Engine::Gpib(_) | Engine::UsbTmc(_)) {
                    Err(unsupported(kind))
                } else {
                    Ok(AttributeValue::KeepAlive(self.keep_alive))
                }
            }
        }
    }

    fn set_attribute(&mut self, value: AttributeValue) -> Result<()> {
        match value {
            AttributeValue::Timeout(d) => {
                self.timeout = d;
                Ok(())
            }
            AttributeValue::TermChar(c) => {
                self.term_char = c;
                Ok(())
            }
            AttributeValue::SendEnd(b) => {
                self.send_end = b;
                Ok(())
            }
            AttributeValue::SuppressEndOnRead(b) => {
                self.suppress_end = b;
                Ok(())
            }
            AttributeValue::IoProtocol(p) => {
                // Vxi11/Hislip are derived from which engine the session opened with,
                // not a free-standing field a caller can spoof; only Normal/Raw
                // framing on a socket-backed engine is actually selectable.
                if matches!(self.engine, Engine::Vxi11(_) | Engine::HiSlip(_)) {
                    return Err(unsupported(AttributeKind::IoProtocol));
                }
                match p {
                    IoProtocol::Normal | IoProtocol::Raw => {
                        self.io_protocol = p;
                        Ok(())
                    }
                    IoProtocol::Vxi11 | IoProtocol::Hislip => Err(unsupported(AttributeKind::IoProtocol)),
                }
            }
            AttributeValue::KeepAlive(enable) => self.set_keep_alive(enable),
        }
    }
}
impl Session {
    /// `TCPIP_KEEPALIVE`: SO_KEEPALIVE on the underlying socket, for every Ethernet
    /// sub-protocol (SPEC_FULL.md S6). GPIB/USBTMC have no socket and reject it.
    fn set_keep_alive(&mut self, enable: bool) -> Result<()> {
        match &mut self.engine {
            Engine::Vxi11(link) => link.set_keep_alive(enable)?,
            Engine::HiSlip(link) => link.set_keep_alive(enable)?,
            Engine::Raw(transport) => transport.set_keep_alive(enable)?,
            Engine::Gpib(_) | Engine::UsbTmc(_) => return Err(unsupported(AttributeKind::KeepAlive)),
        }
        self.keep_alive = enable;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::resource::{GpibAddress, ResourceAddress};

    /// Hands out fixed-size chunks from a queue, reporting EOI only on the chunk
    /// the test marks as the last one.
    struct FakeGpib {
        chunks: VecDeque<(Vec<u8>, bool)>,
    }
    #[async_trait]
    impl GpibTransport for FakeGpib {
        async fn write(&mut self, _p: u8, _s: Option<u8>, data: &[u8], _eoi: bool) -> Result<usize> {
            Ok(data.len())
        }
        async fn read(&mut self, _p: u8, _s: Option<u8>, buf: &mut [u8]) -> Result<(usize, bool)> {
            let (chunk, eoi) = self.chunks.pop_front().expect("fake exhausted");
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok((chunk.len(), eoi))
        }
        async fn clear(&mut self, _p: u8, _s: Option<u8>) -> Result<()> {
            Ok(())
        }
        async fn trigger(&mut self, _p: u8, _s: Option<u8>) -> Result<()> {
            Ok(())
        }
        async fn serial_poll(&mut self, _p: u8, _s: Option<u8>) -> Result<u8> {
            Ok(0x40)
        }
        async fn find_listeners(&mut self) -> Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    fn gpib_session(chunks: Vec<(Vec<u8>, bool)>) -> Session {
        let transport: Box<dyn GpibTransport> = Box::new(FakeGpib { chunks: chunks.into() });
        let link = GpibLink::new(transport, 9, None);
        let resource = ResourceAddress::Gpib(GpibAddress { board: 0, primary: 9, secondary: None });
        Session::new(Engine::Gpib(link), resource, QuirkFlags::empty())
    }

    #[tokio::test]
    async fn read_stops_on_end_when_suppress_end_is_off() {
        let mut session = gpib_session(vec![(b"hello".to_vec(), true)]);
        let (data, reason) = session.read(64).await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(reason, CompletionReason::End);
    }

    #[tokio::test]
    async fn suppress_end_keeps_reading_past_end_until_term_char() {
        let mut session = gpib_session(vec![
            (b"part1".to_vec(), true),
            (b"part2\n".to_vec(), true),
        ]);
        session.set_attribute(AttributeValue::SuppressEndOnRead(true)).unwrap();
        session.set_attribute(AttributeValue::TermChar(Some(b'\n'))).unwrap();

        let (data, reason) = session.read(64).await.unwrap();
        assert_eq!(data, b"part1part2\n");
        assert_eq!(reason, CompletionReason::TermChar);
    }

    #[tokio::test]
    async fn suppress_end_exhausting_max_len_reports_max_count_not_end() {
        let mut session = gpib_session(vec![
            (b"ab".to_vec(), true),
            (b"cd".to_vec(), true),
        ]);
        session.set_attribute(AttributeValue::SuppressEndOnRead(true)).unwrap();

        let (data, reason) = session.read(4).await.unwrap();
        assert_eq!(data, b"abcd");
        assert_eq!(reason, CompletionReason::MaxCount);
    }

    #[tokio::test]
    async fn term_char_on_gpib_truncates_past_eoi_chunk() {
        let mut session = gpib_session(vec![(b"ab\ncd".to_vec(), true)]);
        session.set_attribute(AttributeValue::TermChar(Some(b'\n'))).unwrap();
        let (data, reason) = session.read(64).await.unwrap();
        assert_eq!(data, b"ab\n");
        assert_eq!(reason, CompletionReason::TermChar);
    }

    #[tokio::test]
    async fn keep_alive_is_unsupported_on_gpib_and_usbtmc() {
        let mut session = gpib_session(vec![]);
        let err = session.set_attribute(AttributeValue::KeepAlive(true)).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
        assert!(matches!(
            session.get_attribute(AttributeKind::KeepAlive),
            Err(Error::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn attribute_roundtrip_timeout_and_send_end() {
        let mut session = gpib_session(vec![]);
        session.set_attribute(AttributeValue::Timeout(Duration::from_millis(250))).unwrap();
        session.set_attribute(AttributeValue::SendEnd(false)).unwrap();
        assert_eq!(
            session.get_attribute(AttributeKind::Timeout).unwrap(),
            AttributeValue::Timeout(Duration::from_millis(250))
        );
        assert_eq!(
            session.get_attribute(AttributeKind::SendEnd).unwrap(),
            AttributeValue::SendEnd(false)
        );
    }

    #[tokio::test]
    async fn io_protocol_cannot_be_spoofed_on_a_gpib_session() {
        let mut session = gpib_session(vec![]);
        assert_eq!(
            session.get_attribute(AttributeKind::IoProtocol).unwrap(),
            AttributeValue::IoProtocol(IoProtocol::Normal)
        );
        assert!(matches!(
            session.set_attribute(AttributeValue::IoProtocol(IoProtocol::Vxi11)),
            Err(Error::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn read_stb_dispatches_to_gpib_serial_poll() {
        let mut session = gpib_session(vec![]);
        assert_eq!(session.read_stb().await.unwrap(), 0x40);
    }

    #[tokio::test]
    async fn flush_is_a_no_op_success() {
        let mut session = gpib_session(vec![]);
        session.flush().await.unwrap();
    }

    #[tokio::test]
    async fn go_local_unsupported_outside_vxi11() {
        let mut session = gpib_session(vec![]);
        assert!(matches!(session.go_local().await, Err(Error::NotSupported(_))));
    }

    #[tokio::test]
    async fn lock_and_unlock_track_state_without_wire_call() {
        let mut session = gpib_session(vec![]);
        session.lock(true, None, false).await.unwrap();
        assert_eq!(session.lock_state, LockState::Exclusive);
        session.unlock().await.unwrap();
        assert_eq!(session.lock_state, LockState::Unlocked);
    }
}
