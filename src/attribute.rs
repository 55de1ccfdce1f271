//! The tagged attribute type used by `Session::get_attribute`/`set_attribute`
//! (SPEC_FULL.md §4.8, §9).
//!
//! The teacher has no attribute layer of its own; the generic-trait shape
//! (`get_attribute<T>`/`set_attribute<T>`) surveyed in
//! `other_examples/6f3a7660_caliangroup-libvisa__src-session.rs.rs` was rejected in
//! favor of one closed, tagged enum so that unsupported attributes fail with a single
//! `ERROR_NSUP_ATTR` match arm per engine rather than a generic `AsViReadable` trait
//! each engine would need to implement for every possible `T`.

use std::time::Duration;

use crate::error::{Error, Result};

/// One attribute value, named by what it configures rather than by a raw VISA
/// attribute constant.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Timeout(Duration),
    TermChar(Option<u8>),
    SendEnd(bool),
    SuppressEndOnRead(bool),
    IoProtocol(IoProtocol),
    KeepAlive(bool),
}

/// Selects which `AttributeValue` variant a `get_attribute` call is asking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    Timeout,
    TermChar,
    SendEnd,
    SuppressEndOnRead,
    IoProtocol,
    KeepAlive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoProtocol {
    Normal,
    /// TCPIP SOCKET / VICP-style raw framing, no message boundaries beyond the
    /// termination character.
    Raw,
    /// VXI-11 Device Core channel (SPEC_FULL.md §3 data model).
    Vxi11,
    /// HiSLIP sync/async channel pair (SPEC_FULL.md §3 data model).
    Hislip,
}

/// Implemented by each session/engine so that attribute get/set can be dispatched
/// uniformly from `crate::session::Session` without a match arm per engine at the
/// call site.
pub trait AttributeTarget {
    fn get_attribute(&self, kind: AttributeKind) -> Result<AttributeValue>;
    fn set_attribute(&mut self, value: AttributeValue) -> Result<()>;
}

/// Shared helper for engines that only support a subset of attributes: returns the
/// uniform "not supported" error for anything not explicitly handled.
pub fn unsupported(kind: AttributeKind) -> Error {
    Error::NotSupported(format!("attribute {kind:?} is not supported by this engine"))
}

#[cfg(test)]
mod test {
    use super::*;

    struct Fixture {
        timeout: Duration,
    }
    impl AttributeTarget for Fixture {
        fn get_attribute(&self, kind: AttributeKind) -> Result<AttributeValue> {
            match kind {
                AttributeKind::Timeout => Ok(AttributeValue::Timeout(self.timeout)),
                other => Err(unsupported(other)),
            }
        }
        fn set_attribute(&mut self, value: AttributeValue) -> Result<()> {
            match value {
                AttributeValue::Timeout(d) => {
                    self.timeout = d;
                    Ok(())
                }
                _ => Err(unsupported(AttributeKind::TermChar)),
            }
        }
    }

    #[test]
    fn unsupported_attribute_is_nsup_attr() {
        let f = Fixture {
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            f.get_attribute(AttributeKind::TermChar),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn supported_attribute_roundtrips() {
        let mut f = Fixture {
            timeout: Duration::from_secs(1),
        };
        f.set_attribute(AttributeValue::Timeout(Duration::from_millis(500)))
            .unwrap();
        assert_eq!(
            f.get_attribute(AttributeKind::Timeout).unwrap(),
            AttributeValue::Timeout(Duration::from_millis(500))
        );
    }
}
