//! GPIB engine: a thin layer over a platform driver, modeled as the narrow
//! [`GpibTransport`] capability trait, plus the primary/secondary discovery sweep
//! (SPEC_FULL.md §4.6).
//!
//! There is no maintained, safe async GPIB crate to ground a concrete backend on, so
//! (per `Cargo.toml`'s `gpib` feature comment) this module only supplies the engine
//! logic above the trait; a real driver is supplied by the embedding application.

use std::time::Duration;

use crate::{error::Result, status::CompletionReason, transport::GpibTransport};

pub struct GpibLink<T: GpibTransport> {
    transport: T,
    primary: u8,
    secondary: Option<u8>,
}
impl<T: GpibTransport> GpibLink<T> {
    pub fn new(transport: T, primary: u8, secondary: Option<u8>) -> Self {
        Self { transport, primary, secondary }
    }

    pub async fn write(&mut self, data: &[u8], send_end: bool) -> Result<usize> {
        self.transport.write(self.primary, self.secondary, data, send_end).await
    }

    /// Reads up to `buf.len()` bytes, stopping early on END (EOI asserted by the
    /// device on its last byte).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(usize, CompletionReason)> {
        let (n, end) = self.transport.read(self.primary, self.secondary, buf).await?;
        Ok((n, if end { CompletionReason::End } else { CompletionReason::MaxCount }))
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.transport.clear(self.primary, self.secondary).await
    }

    /// Group Execute Trigger.
    pub async fn trigger(&mut self) -> Result<()> {
        self.transport.trigger(self.primary, self.secondary).await
    }

    pub async fn read_stb(&mut self) -> Result<u8> {
        self.transport.serial_poll(self.primary, self.secondary).await
    }
}

/// One discovered device address, already in NI-VISA secondary-address form
/// (0..30), never the raw bus form (96..126).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscoveredAddress {
    pub primary: u8,
    pub secondary: Option<u8>,
}

/// Sweeps all 31 primary addresses. A primary that answers as a listener is
/// reported without probing its secondaries — most devices ignore secondary
/// addressing and a probe can upset them. A primary with no listener is probed at
/// all 31 secondaries, which is how a command module (e.g. an HP E1406A) exposes the
/// VXI modules behind it.
pub async fn discover<T: GpibTransport>(transport: &mut T, _timeout: Duration) -> Result<Vec<DiscoveredAddress>> {
    let listeners = transport.find_listeners().await?;
    let mut found = Vec::new();

    for primary in 0..=30u8 {
        if listeners.contains(&primary) {
            found.push(DiscoveredAddress { primary, secondary: None });
            continue;
        }
        // No direct listener; this primary may still front a command module whose
        // sub-devices only answer with a secondary address set.
        for secondary in 0..=30u8 {
            if probe_secondary(transport, primary, secondary).await? {
                found.push(DiscoveredAddress { primary, secondary: Some(secondary) });
            }
        }
    }

    Ok(found)
}

async fn probe_secondary<T: GpibTransport>(transport: &mut T, primary: u8, secondary: u8) -> Result<bool> {
    Ok(transport.serial_poll(primary, Some(secondary)).await.is_ok())
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FakeGpib {
        listeners: HashSet<u8>,
        secondaries: HashSet<(u8, u8)>,
    }
    #[async_trait]
    impl GpibTransport for FakeGpib {
        async fn write(&mut self, _p: u8, _s: Option<u8>, data: &[u8], _eoi: bool) -> Result<usize> {
            Ok(data.len())
        }
        async fn read(&mut self, _p: u8, _s: Option<u8>, buf: &mut [u8]) -> Result<(usize, bool)> {
            Ok((buf.len(), true))
        }
        async fn clear(&mut self, _p: u8, _s: Option<u8>) -> Result<()> {
            Ok(())
        }
        async fn trigger(&mut self, _p: u8, _s: Option<u8>) -> Result<()> {
            Ok(())
        }
        async fn serial_poll(&mut self, primary: u8, secondary: Option<u8>) -> Result<u8> {
            match secondary {
                None => {
                    if self.listeners.contains(&primary) {
                        Ok(0)
                    } else {
                        Err(crate::error::Error::Timeout { message: "no listener".into(), partial: vec![] })
                    }
                }
                Some(s) => {
                    if self.secondaries.contains(&(primary, s)) {
                        Ok(0)
                    } else {
                        Err(crate::error::Error::Timeout { message: "no listener".into(), partial: vec![] })
                    }
                }
            }
        }
        async fn find_listeners(&mut self) -> Result<Vec<u8>> {
            Ok(self.listeners.iter().copied().collect())
        }
    }

    #[tokio::test]
    async fn primary_listener_skips_secondary_probe() {
        let mut gpib = FakeGpib {
            listeners: HashSet::from([9]),
            secondaries: HashSet::from([(9, 1)]), // would be found if (wrongly) probed
        };
        let found = discover(&mut gpib, Duration::from_millis(10)).await.unwrap();
        assert_eq!(found, vec![DiscoveredAddress { primary: 9, secondary: None }]);
    }

    #[tokio::test]
    async fn no_primary_listener_probes_all_secondaries() {
        let mut gpib = FakeGpib {
            listeners: HashSet::new(),
            secondaries: HashSet::from([(5, 0), (5, 1)]),
        };
        let found = discover(&mut gpib, Duration::from_millis(10)).await.unwrap();
        assert!(found.contains(&DiscoveredAddress { primary: 5, secondary: Some(0) }));
        assert!(found.contains(&DiscoveredAddress { primary: 5, secondary: Some(1) }));
    }
}
