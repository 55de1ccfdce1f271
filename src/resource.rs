//! Resource-name grammar (SPEC_FULL.md §3) and the associated `open` options.
//!
//! Grounded on the address-parsing shape of `other_examples/b31c2f53_RossSmyth-fisa__src-address.rs.rs`
//! (an `Address` enum reached through a `parse` free function, round-trip tested via
//! `Display`), adapted to this backend's own [`Error`] rather than `thiserror` to stay
//! aligned with the teacher's hand-rolled error style.

use std::fmt::Display;

use crate::error::{Error, Result};

/// Default LAN device name used by VXI-11 and HiSLIP when the resource string omits one.
pub const DEFAULT_LAN_DEVICE_NAME: &str = "inst0";

/// A parsed VISA resource string (SPEC_FULL.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceAddress {
    Tcpip(TcpipAddress),
    Usb(UsbAddress),
    Gpib(GpibAddress),
    Asrl(AsrlAddress),
}
impl ResourceAddress {
    pub fn parse(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        if upper.starts_with("TCPIP") {
            TcpipAddress::parse(s).map(Self::Tcpip)
        } else if upper.starts_with("USB") {
            UsbAddress::parse(s).map(Self::Usb)
        } else if upper.starts_with("GPIB") {
            GpibAddress::parse(s).map(Self::Gpib)
        } else if upper.starts_with("ASRL") {
            AsrlAddress::parse(s).map(Self::Asrl)
        } else {
            Err(Error::InvalidResource(s.to_string()))
        }
    }
}
impl Display for ResourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcpip(a) => a.fmt(f),
            Self::Usb(a) => a.fmt(f),
            Self::Gpib(a) => a.fmt(f),
            Self::Asrl(a) => a.fmt(f),
        }
    }
}

/// Splits a `::`-delimited resource string into the leading keyword+board token
/// and the remaining fields.
fn split_fields(s: &str) -> Vec<&str> {
    s.split("::").collect()
}

/// Splits a leading token like `TCPIP0` or `GPIB` into (keyword, board).
fn split_keyword_board(token: &str, keyword: &str) -> Result<u8, Error> {
    let upper = token.to_ascii_uppercase();
    let rest = upper
        .strip_prefix(keyword)
        .ok_or_else(|| Error::InvalidResource(token.to_string()))?;
    if rest.is_empty() {
        Ok(0)
    } else {
        rest.parse()
            .map_err(|_| Error::InvalidResource(format!("bad board number in `{token}`")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TcpipKind {
    /// `TCPIP[board]::host[::lan_device_name]::INSTR`
    Instr { lan_device_name: String },
    /// `TCPIP[board]::host::port::SOCKET`
    Socket { port: u16 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpipAddress {
    pub board: u8,
    pub host: String,
    pub kind: TcpipKind,
}
impl TcpipAddress {
    fn parse(s: &str) -> Result<Self> {
        let fields = split_fields(s);
        let board = split_keyword_board(fields[0], "TCPIP")?;

        match fields.len() {
            // TCPIP[board]::host::INSTR
            3 if fields[2].eq_ignore_ascii_case("INSTR") => Ok(Self {
                board,
                host: fields[1].to_string(),
                kind: TcpipKind::Instr {
                    lan_device_name: DEFAULT_LAN_DEVICE_NAME.to_string(),
                },
            }),
            // TCPIP[board]::host::lan_device_name::INSTR
            4 if fields[3].eq_ignore_ascii_case("INSTR") => Ok(Self {
                board,
                host: fields[1].to_string(),
                kind: TcpipKind::Instr {
                    lan_device_name: fields[2].to_string(),
                },
            }),
            // TCPIP[board]::host::port::SOCKET
            4 if fields[3].eq_ignore_ascii_case("SOCKET") => {
                let port = fields[2]
                    .parse()
                    .map_err(|_| Error::InvalidResource(format!("bad port in `{s}`")))?;
                Ok(Self {
                    board,
                    host: fields[1].to_string(),
                    kind: TcpipKind::Socket { port },
                })
            }
            _ => Err(Error::InvalidResource(s.to_string())),
        }
    }

    /// True when the LAN device name marks this as a HiSLIP sub-address.
    pub fn is_hislip(&self) -> bool {
        matches!(&self.kind, TcpipKind::Instr { lan_device_name } if lan_device_name.to_ascii_lowercase().starts_with("hislip"))
    }
}
impl Display for TcpipAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TcpipKind::Instr { lan_device_name } => {
                write!(f, "TCPIP{}::{}::{}::INSTR", self.board, self.host, lan_device_name)
            }
            TcpipKind::Socket { port } => {
                write!(f, "TCPIP{}::{}::{}::SOCKET", self.board, self.host, port)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbAddress {
    pub board: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: String,
    pub interface: Option<u8>,
    pub raw: bool,
}
impl UsbAddress {
    fn parse(s: &str) -> Result<Self> {
        let fields = split_fields(s);
        let board = split_keyword_board(fields[0], "USB")?;

        let bad = || Error::InvalidResource(s.to_string());
        let parse_hex = |s: &str| -> Result<u16> {
            let s = s.trim_start_matches("0x").trim_start_matches("0X");
            u16::from_str_radix(s, 16).map_err(|_| bad())
        };

        let kind = fields.last().copied().ok_or_else(bad)?;
        let raw = if kind.eq_ignore_ascii_case("RAW") {
            true
        } else if kind.eq_ignore_ascii_case("INSTR") {
            false
        } else {
            return Err(bad());
        };

        match fields.len() {
            // USB[board]::vendor::product::serial::{INSTR|RAW}
            5 => Ok(Self {
                board,
                vendor_id: parse_hex(fields[1])?,
                product_id: parse_hex(fields[2])?,
                serial: fields[3].to_string(),
                interface: None,
                raw,
            }),
            // USB[board]::vendor::product::serial::interface::{INSTR|RAW}
            6 => Ok(Self {
                board,
                vendor_id: parse_hex(fields[1])?,
                product_id: parse_hex(fields[2])?,
                serial: fields[3].to_string(),
                interface: Some(fields[4].parse().map_err(|_| bad())?),
                raw,
            }),
            _ => Err(bad()),
        }
    }
}
impl Display for UsbAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "USB{}::0x{:04X}::0x{:04X}::{}",
            self.board, self.vendor_id, self.product_id, self.serial
        )?;
        if let Some(iface) = self.interface {
            write!(f, "::{iface}")?;
        }
        write!(f, "::{}", if self.raw { "RAW" } else { "INSTR" })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpibAddress {
    pub board: u8,
    pub primary: u8,
    pub secondary: Option<u8>,
}
impl GpibAddress {
    fn parse(s: &str) -> Result<Self> {
        let fields = split_fields(s);
        let board = split_keyword_board(fields[0], "GPIB")?;
        let bad = || Error::InvalidResource(s.to_string());

        match fields.len() {
            3 if fields[2].eq_ignore_ascii_case("INSTR") => Ok(Self {
                board,
                primary: fields[1].parse().map_err(|_| bad())?,
                secondary: None,
            }),
            4 if fields[3].eq_ignore_ascii_case("INSTR") => Ok(Self {
                board,
                primary: fields[1].parse().map_err(|_| bad())?,
                secondary: Some(fields[2].parse().map_err(|_| bad())?),
            }),
            _ => Err(bad()),
        }
    }
}
impl Display for GpibAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GPIB{}::{}", self.board, self.primary)?;
        if let Some(secondary) = self.secondary {
            write!(f, "::{secondary}")?;
        }
        write!(f, "::INSTR")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsrlAddress {
    pub board: String,
}
impl AsrlAddress {
    fn parse(s: &str) -> Result<Self> {
        let fields = split_fields(s);
        let bad = || Error::InvalidResource(s.to_string());
        if fields.len() != 2 || !fields[1].eq_ignore_ascii_case("INSTR") {
            return Err(bad());
        }
        let upper = fields[0].to_ascii_uppercase();
        let board = fields[0]
            .get(4..)
            .filter(|_| upper.starts_with("ASRL"))
            .ok_or_else(bad)?;
        Ok(Self {
            board: board.to_string(),
        })
    }
}
impl Display for AsrlAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ASRL{}::INSTR", self.board)
    }
}

/// Access mode requested at `open` (SPEC_FULL.md §3, §6).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    NoLock,
    ExclusiveLock,
    SharedLock {
        requested_key: Option<String>,
    },
}

/// Options accepted by `open`. A plain struct with `Default`, not a builder with
/// hidden state, mirroring `SessionOptions` in
/// `other_examples/6f3a7660_caliangroup-libvisa__src-session.rs.rs`.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    pub access_mode: AccessMode,
    pub open_timeout: std::time::Duration,
    /// Initial read termination character, applied before the first I/O call.
    pub term_char: Option<u8>,
    pub send_end: bool,
    pub suppress_end: bool,
}
impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::default(),
            open_timeout: std::time::Duration::from_secs(2),
            term_char: None,
            send_end: true,
            suppress_end: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(s: &str) {
        let addr = ResourceAddress::parse(s).unwrap();
        let again = ResourceAddress::parse(&addr.to_string()).unwrap();
        assert_eq!(addr, again, "{s} did not round-trip (canonical: {addr})");
    }

    #[test]
    fn tcpip_instr_default_device_name() {
        let addr = ResourceAddress::parse("TCPIP0::192.0.2.10::INSTR").unwrap();
        let ResourceAddress::Tcpip(tcpip) = &addr else {
            panic!("expected Tcpip");
        };
        assert_eq!(tcpip.board, 0);
        assert_eq!(tcpip.host, "192.0.2.10");
        assert_eq!(
            tcpip.kind,
            TcpipKind::Instr {
                lan_device_name: "inst0".into()
            }
        );
        assert!(!tcpip.is_hislip());
        roundtrip("TCPIP0::192.0.2.10::INSTR");
    }

    #[test]
    fn tcpip_hislip_detected_by_device_name() {
        let addr = ResourceAddress::parse("TCPIP0::192.0.2.10::hislip0::INSTR").unwrap();
        let ResourceAddress::Tcpip(tcpip) = &addr else {
            panic!("expected Tcpip");
        };
        assert!(tcpip.is_hislip());
        roundtrip("TCPIP0::192.0.2.10::hislip0::INSTR");
    }

    #[test]
    fn tcpip_socket() {
        let addr = ResourceAddress::parse("TCPIP0::192.0.2.10::5025::SOCKET").unwrap();
        let ResourceAddress::Tcpip(tcpip) = &addr else {
            panic!("expected Tcpip");
        };
        assert_eq!(tcpip.kind, TcpipKind::Socket { port: 5025 });
        roundtrip("TCPIP0::192.0.2.10::5025::SOCKET");
    }

    #[test]
    fn usb_instr_with_interface() {
        let addr = ResourceAddress::parse("USB0::0x1234::0x5678::SN1::0::INSTR").unwrap();
        let ResourceAddress::Usb(usb) = &addr else {
            panic!("expected Usb");
        };
        assert_eq!(usb.vendor_id, 0x1234);
        assert_eq!(usb.product_id, 0x5678);
        assert_eq!(usb.interface, Some(0));
        assert!(!usb.raw);
        roundtrip("USB0::0x1234::0x5678::SN1::0::INSTR");
    }

    #[test]
    fn usb_raw_without_interface() {
        let addr = ResourceAddress::parse("USB0::0x1234::0x5678::SN1::RAW").unwrap();
        let ResourceAddress::Usb(usb) = &addr else {
            panic!("expected Usb");
        };
        assert!(usb.raw);
        assert_eq!(usb.interface, None);
        roundtrip("USB0::0x1234::0x5678::SN1::RAW");
    }

    #[test]
    fn gpib_primary_only() {
        let addr = ResourceAddress::parse("GPIB0::9::INSTR").unwrap();
        let ResourceAddress::Gpib(gpib) = &addr else {
            panic!("expected Gpib");
        };
        assert_eq!(gpib.primary, 9);
        assert_eq!(gpib.secondary, None);
        roundtrip("GPIB0::9::INSTR");
    }

    #[test]
    fn gpib_with_secondary() {
        let addr = ResourceAddress::parse("GPIB0::9::1::INSTR").unwrap();
        let ResourceAddress::Gpib(gpib) = &addr else {
            panic!("expected Gpib");
        };
        assert_eq!(gpib.secondary, Some(1));
        roundtrip("GPIB0::9::1::INSTR");
    }

    #[test]
    fn asrl_board() {
        let addr = ResourceAddress::parse("ASRL1::INSTR").unwrap();
        let ResourceAddress::Asrl(asrl) = &addr else {
            panic!("expected Asrl");
        };
        assert_eq!(asrl.board, "1");
        roundtrip("ASRL1::INSTR");
    }

    #[test]
    fn asrl_pyserial_url_board() {
        let addr = ResourceAddress::parse("ASRLloop://::INSTR").unwrap();
        let ResourceAddress::Asrl(asrl) = &addr else {
            panic!("expected Asrl");
        };
        assert_eq!(asrl.board, "loop://");
        roundtrip("ASRLloop://::INSTR");
    }

    #[test]
    fn case_insensitive_keywords() {
        assert!(ResourceAddress::parse("tcpip0::host::instr").is_ok());
        assert!(ResourceAddress::parse("gpib0::9::instr").is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ResourceAddress::parse("NOT_A_RESOURCE").is_err());
        assert!(ResourceAddress::parse("GPIB0::9::1::2::INSTR").is_err());
    }
}
