//! Shared `read_until` loop for the byte-stream transports that have no protocol-level
//! end indicator of their own: raw `SOCKET`, VICP, and serial (SPEC_FULL.md §4.1).
//!
//! Grounded on the read loop in
//! `examples/farlepet-testeq-rs/src/protocol/scpi_serial.rs` (`recv_until`), pulled out
//! so the TCP-socket, VICP, and serial engines share one implementation instead of
//! three copies of the same deadline/byte-at-a-time loop.

use tokio::time::Instant;

use crate::{
    error::{Error, Result},
    status::CompletionReason,
    transport::Transport,
};

/// Reads from `transport` until `term_char` (if set) is seen, `max_len` bytes have
/// been collected, or `deadline` passes. A timeout carries whatever was already read.
pub async fn read_until(
    transport: &mut dyn Transport,
    max_len: usize,
    term_char: Option<u8>,
    deadline: Instant,
) -> Result<(Vec<u8>, CompletionReason)> {
    let mut data = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if data.len() >= max_len {
            return Ok((data, CompletionReason::MaxCount));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::timeout_with_partial("read timed out", data));
        }

        let read = match tokio::time::timeout(remaining, transport.read(&mut byte)).await {
            Ok(res) => res,
            Err(_) => return Err(Error::timeout_with_partial("read timed out", data)),
        };

        match read {
            Ok(0) => {
                return Err(Error::ConnectionLost(
                    "transport closed before termination condition was met".into(),
                ));
            }
            Ok(_) => {
                data.push(byte[0]);
                if term_char == Some(byte[0]) {
                    return Ok((data, CompletionReason::TermChar));
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{collections::VecDeque, time::Duration};

    use async_trait::async_trait;

    use super::*;

    struct FakeTransport {
        inbound: VecDeque<u8>,
    }
    #[async_trait]
    impl Transport for FakeTransport {
        async fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.inbound.pop_front() {
                Some(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn peer_description(&self) -> String {
            "fake".into()
        }
    }

    #[tokio::test]
    async fn stops_on_term_char() {
        let mut t = FakeTransport {
            inbound: b"hello\n".iter().copied().collect(),
        };
        let deadline = Instant::now() + Duration::from_secs(1);
        let (data, reason) = read_until(&mut t, 64, Some(b'\n'), deadline).await.unwrap();
        assert_eq!(data, b"hello\n");
        assert_eq!(reason, CompletionReason::TermChar);
    }

    #[tokio::test]
    async fn stops_on_max_count_without_term_char() {
        let mut t = FakeTransport {
            inbound: b"hello world".iter().copied().collect(),
        };
        let deadline = Instant::now() + Duration::from_secs(1);
        let (data, reason) = read_until(&mut t, 5, None, deadline).await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(reason, CompletionReason::MaxCount);
    }

    #[tokio::test]
    async fn closed_transport_is_connection_lost() {
        let mut t = FakeTransport { inbound: VecDeque::new() };
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = read_until(&mut t, 64, Some(b'\n'), deadline).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost(_)));
    }
}
