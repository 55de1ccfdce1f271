//! Real `UsbTransport` over `rusb`, gated behind the `usb` feature
//! (SPEC_FULL.md §4.5, §9 "dynamic optional dependencies").
//!
//! Grounded on the `rusb::{Context, DeviceHandle}` blocking-call style shown in
//! `other_examples/6974b17b_BjornTheProgrammer-elf2flash__crates-elf2flash-src-bin-uf2.rs.rs`.
//! `rusb` has no async API; its calls block the calling task's OS thread for the
//! duration of the USB transfer, same as that reference file does.

use std::time::Duration;

use async_trait::async_trait;
use rusb::{Context, DeviceHandle, UsbContext};

use crate::{
    error::{Error, Result},
    quirks::QuirkFlags,
    transport::UsbTransport,
};

fn to_err(e: rusb::Error) -> Error {
    Error::IoError(std::io::Error::other(e))
}

pub struct RusbTransport {
    handle: DeviceHandle<Context>,
    vendor_id: u16,
    product_id: u16,
    serial: String,
    interrupt_in_ep: Option<u8>,
    bulk_out_ep: u8,
    bulk_in_ep: u8,
    bulk_in_max_packet: usize,
}
impl RusbTransport {
    /// Opens the first device matching `vendor_id`/`product_id`/`serial` (an empty
    /// serial matches any device lacking a serial-number descriptor) and claims
    /// `interface`.
    ///
    /// `quirks` gates two vendor-specific workarounds (SPEC_FULL.md §4.5, §4.9):
    /// `NEEDS_RESET_ON_OPEN` issues a USB bus reset right after opening, and
    /// `ONLY_ONE_SET_CONFIGURATION` skips re-selecting the active configuration,
    /// since some devices (Rigol) lose communication when the kernel driver is
    /// detached and reattached by a repeated `set_active_configuration`.
    pub fn open(vendor_id: u16, product_id: u16, serial: &str, interface: u8, quirks: QuirkFlags) -> Result<Self> {
        let context = Context::new().map_err(to_err)?;
        let devices = context.devices().map_err(to_err)?;

        for device in devices.iter() {
            let Ok(desc) = device.device_descriptor() else { continue };
            if desc.vendor_id() != vendor_id || desc.product_id() != product_id {
                continue;
            }
            let Ok(mut handle) = device.open() else { continue };

            let device_serial = handle.read_serial_number_string_ascii(&desc).unwrap_or_default();
            if !serial.is_empty() && device_serial != serial {
                continue;
            }

            if quirks.contains(QuirkFlags::NEEDS_RESET_ON_OPEN) {
                handle.reset().map_err(to_err)?;
            }

            if !quirks.contains(QuirkFlags::ONLY_ONE_SET_CONFIGURATION) {
                if let Ok(config) = device.active_config_descriptor() {
                    handle.set_active_configuration(config.number()).ok();
                }
            }

            let interrupt_in_ep = find_interrupt_in_endpoint(&device, interface);
            let (bulk_out_ep, bulk_in_ep, bulk_in_max_packet) = find_bulk_endpoints(&device, interface)
                .ok_or_else(|| Error::BadResponse("USBTMC interface has no bulk-IN/OUT endpoint pair".into()))?;

            handle.set_auto_detach_kernel_driver(true).ok();
            handle.claim_interface(interface).map_err(to_err)?;

            return Ok(Self {
                handle,
                vendor_id,
                product_id,
                serial: device_serial,
                interrupt_in_ep,
                bulk_out_ep,
                bulk_in_ep,
                bulk_in_max_packet,
            });
        }

        Err(Error::ResourceNotFound(format!(
            "no USB device matching {vendor_id:04x}:{product_id:04x} serial \"{serial}\""
        )))
    }

    pub fn bulk_out_endpoint(&self) -> u8 {
        self.bulk_out_ep
    }
    pub fn bulk_in_endpoint(&self) -> u8 {
        self.bulk_in_ep
    }
    pub fn bulk_in_max_packet(&self) -> usize {
        self.bulk_in_max_packet
    }
    pub fn interrupt_in_endpoint(&self) -> Option<u8> {
        self.interrupt_in_ep
    }
}

/// USB488 devices that support `READ_STATUS_BYTE` expose an interrupt-IN endpoint
/// on the USBTMC interface; not every device has one.
fn find_interrupt_in_endpoint(device: &rusb::Device<Context>, interface: u8) -> Option<u8> {
    let config = device.active_config_descriptor().ok()?;
    let iface = config.interfaces().find(|i| i.number() == interface)?;
    iface.descriptors().find_map(|desc| {
        desc.endpoint_descriptors()
            .find(|ep| ep.transfer_type() == rusb::TransferType::Interrupt && ep.direction() == rusb::Direction::In)
            .map(|ep| ep.address())
    })
}

/// The bulk-OUT/bulk-IN endpoint pair and the bulk-IN endpoint's max packet size,
/// used by `crate::manager::ResourceManager::open` to construct a
/// `UsbTmcLink` without the caller needing to know USB descriptor layout.
pub fn find_bulk_endpoints(device: &rusb::Device<Context>, interface: u8) -> Option<(u8, u8, usize)> {
    let config = device.active_config_descriptor().ok()?;
    let iface = config.interfaces().find(|i| i.number() == interface)?;
    for desc in iface.descriptors() {
        let mut out_ep = None;
        let mut in_ep = None;
        for ep in desc.endpoint_descriptors() {
            if ep.transfer_type() != rusb::TransferType::Bulk {
                continue;
            }
            match ep.direction() {
                rusb::Direction::Out => out_ep = Some(ep.address()),
                rusb::Direction::In => in_ep = Some((ep.address(), ep.max_packet_size() as usize)),
            }
        }
        if let (Some(out_ep), Some((in_ep, max_packet))) = (out_ep, in_ep) {
            return Some((out_ep, in_ep, max_packet));
        }
    }
    None
}
#[async_trait]
impl UsbTransport for RusbTransport {
    async fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle.write_bulk(endpoint, data, timeout).map_err(to_err)
    }

    async fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle.read_bulk(endpoint, buf, timeout).map_err(to_err)
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
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
            .map_err(to_err)
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
        self.handle
            .write_control(request_type, request, value, index, data, timeout)
            .map_err(to_err)
    }

    async fn interrupt_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle.read_interrupt(endpoint, buf, timeout).map_err(to_err)
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    fn product_id(&self) -> u16 {
        self.product_id
    }
    fn serial_number(&self) -> &str {
        &self.serial
    }
}
