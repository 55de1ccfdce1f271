//! Instrument discovery: VXI-11 UDP broadcast and mDNS service browse for
//! HiSLIP/VICP (SPEC_FULL.md §4.7, §6 `list_resources`).
//!
//! Neither has a teacher precedent; `vxi11_broadcast` is grounded on the same
//! `protocol::onc::messages`/`xdr` framing the teacher's `vxi11/onc.rs` used for TCP,
//! applied to a UDP socket instead (portmapper `GETPORT` calls are not record-marked
//! over UDP, so framing is just "one packet, one message"). `mdns` is grounded on the
//! `mdns-sd` browse API as used in `other_examples/a91e6f9f_Smithay-client-toolkit__`
//! style service-discovery loops.

#[cfg(feature = "mdns")]
pub mod mdns;
pub mod vxi11_broadcast;

use crate::resource::ResourceAddress;

/// One instrument found by discovery, with the resource string callers can pass
/// straight to `crate::manager::ResourceManager::open`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredInstrument {
    pub resource: ResourceAddress,
    /// `*IDN?` response, if discovery was asked to query it.
    pub idn: Option<String>,
}
