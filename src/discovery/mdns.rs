//! HiSLIP/VICP discovery via mDNS service browse (SPEC_FULL.md §4.7), gated behind
//! the `mdns` feature.

use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};

use crate::{
    error::{Error, Result},
    resource::{ResourceAddress, TcpipAddress, TcpipKind, DEFAULT_LAN_DEVICE_NAME},
};

use super::DiscoveredInstrument;

pub const HISLIP_SERVICE_TYPE: &str = "_hislip._tcp.local.";
pub const LXI_SERVICE_TYPE: &str = "_lxi._tcp.local.";

/// Browses `service_type` for `listen_for`, returning every resolved instance.
/// `lan_device_name_key` names the TXT record holding the LAN device name, when the
/// service advertises one other than the default `inst0` (HiSLIP responders
/// typically publish it as `device`).
pub async fn browse(service_type: &str, listen_for: Duration, lan_device_name_key: &str) -> Result<Vec<DiscoveredInstrument>> {
    let daemon = ServiceDaemon::new().map_err(to_err)?;
    let receiver = daemon.browse(service_type).map_err(to_err)?;

    let mut found = Vec::new();
    let deadline = tokio::time::Instant::now() + listen_for;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let event = match tokio::time::timeout(remaining, receiver.recv_async()).await {
            Ok(Ok(event)) => event,
            _ => break,
        };

        if let ServiceEvent::ServiceResolved(info) = event {
            let Some(host) = info.get_addresses().iter().next() else {
                continue;
            };
            let lan_device_name = info
                .get_property_val_str(lan_device_name_key)
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_LAN_DEVICE_NAME.to_string());

            found.push(DiscoveredInstrument {
                resource: ResourceAddress::Tcpip(TcpipAddress {
                    board: 0,
                    host: host.to_string(),
                    kind: TcpipKind::Instr { lan_device_name },
                }),
                idn: None,
            });
        }
    }

    let _ = daemon.shutdown();
    Ok(found)
}

fn to_err(e: mdns_sd::Error) -> Error {
    Error::Unhandled(Box::new(e))
}
