//! Device Core and Abort channel RPC payloads defined by the VXI-11 specification.
//!
//! Grounded on `examples/farlepet-testeq-rs/src/protocol/vxi11/rpc.rs`, which only
//! covered `create_link`/`device_write`/`device_read`; this adds the remaining
//! Device Core operations the SPEC_FULL.md VXI-11 module requires:
//! `device_clear`, `device_trigger`, `device_lock`/`device_unlock`, `device_readstb`,
//! `device_enable_srq`, `device_local`/`device_remote`, `destroy_link`, and
//! `device_abort`.

use crate::protocol::onc::xdr::{self, XdrPack};
use crate::error::Result;

#[allow(unused)]
#[repr(u32)]
#[derive(Clone, Copy)]
pub enum RpcRequest {
    DeviceAbort = 1,
    CreateLink = 10,
    DeviceWrite = 11,
    DeviceRead = 12,
    DeviceReadStb = 13,
    DeviceTrigger = 14,
    DeviceClear = 15,
    DeviceRemote = 16,
    DeviceLocal = 17,
    DeviceLock = 18,
    DeviceUnlock = 19,
    DeviceEnableSrq = 20,
    DestroyLink = 23,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RpcDeviceErrorCode {
    NoError,
    SyntaxError,
    DeviceNotAccessible,
    InvalidLinkIdentifier,
    ParameterError,
    ChannelNotEstablished,
    OperationNotSupported,
    OutOfResources,
    DeviceLockedByAnotherLink,
    NoLockHeldByThisLink,
    IoTimeout,
    IoError,
    InvalidAddress,
    Abort,
    ChannelAlreadyEstablished,
    Unknown(u32),
}
impl RpcDeviceErrorCode {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(match xdr::unpack_u32(src)? {
            0 => Self::NoError,
            1 => Self::SyntaxError,
            3 => Self::DeviceNotAccessible,
            4 => Self::InvalidLinkIdentifier,
            5 => Self::ParameterError,
            6 => Self::ChannelNotEstablished,
            8 => Self::OperationNotSupported,
            9 => Self::OutOfResources,
            11 => Self::DeviceLockedByAnotherLink,
            12 => Self::NoLockHeldByThisLink,
            15 => Self::IoTimeout,
            17 => Self::IoError,
            21 => Self::InvalidAddress,
            23 => Self::Abort,
            29 => Self::ChannelAlreadyEstablished,
            i => Self::Unknown(i),
        })
    }
}

#[derive(Debug, Default)]
pub struct RpcOperationFlags {
    pub wait_lock: bool,
    pub end: bool,
    pub termchr_set: bool,
}
impl XdrPack for RpcOperationFlags {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        let mut flags = 0u32;
        if self.wait_lock {
            flags |= 1 << 0;
        }
        if self.end {
            flags |= 1 << 3;
        }
        if self.termchr_set {
            flags |= 1 << 7;
        }
        flags.pack_xdr(out);
    }
}

pub struct RpcRequestCreateDeviceLink {
    pub client_id: i32,
    pub lock_device: bool,
    pub lock_timeout: u32,
    pub device: String,
}
impl XdrPack for RpcRequestCreateDeviceLink {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.client_id.pack_xdr(out);
        self.lock_device.pack_xdr(out);
        self.lock_timeout.pack_xdr(out);
        self.device.pack_xdr(out);
    }
}

#[allow(unused)]
pub struct RpcResponseCreateDeviceLink {
    pub error: RpcDeviceErrorCode,
    pub lid: i32,
    pub abort_port: u16,
    pub max_recv_size: u32,
}
impl RpcResponseCreateDeviceLink {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            error: RpcDeviceErrorCode::unpack(src)?,
            lid: xdr::unpack_i32(src)?,
            abort_port: xdr::unpack_u16(src)?,
            max_recv_size: xdr::unpack_u32(src)?,
        })
    }
}

pub struct RpcRequestDeviceWrite {
    pub lid: i32,
    pub io_timeout: u32,
    pub lock_timeout: u32,
    pub flags: RpcOperationFlags,
    pub data: Vec<u8>,
}
impl XdrPack for RpcRequestDeviceWrite {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
        self.io_timeout.pack_xdr(out);
        self.lock_timeout.pack_xdr(out);
        self.flags.pack_xdr(out);
        self.data.pack_xdr(out);
    }
}

#[allow(unused)]
pub struct RpcResponseDeviceWrite {
    pub error: RpcDeviceErrorCode,
    pub size: u32,
}
impl RpcResponseDeviceWrite {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            error: RpcDeviceErrorCode::unpack(src)?,
            size: xdr::unpack_u32(src)?,
        })
    }
}

pub struct RpcRequestDeviceRead {
    pub lid: i32,
    pub request_size: u32,
    pub io_timeout: u32,
    pub lock_timeout: u32,
    pub flags: RpcOperationFlags,
    pub termchr: u8,
}
impl XdrPack for RpcRequestDeviceRead {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
        self.request_size.pack_xdr(out);
        self.io_timeout.pack_xdr(out);
        self.lock_timeout.pack_xdr(out);
        self.flags.pack_xdr(out);
        (self.termchr as u32).pack_xdr(out);
    }
}

#[allow(unused)]
pub struct RpcDeviceReadReason {
    pub reqcnt: bool,
    pub chr: bool,
    pub end: bool,
}
impl RpcDeviceReadReason {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        let flags = xdr::unpack_u32(src)?;
        Ok(Self {
            reqcnt: (flags & (1 << 0)) != 0,
            chr: (flags & (1 << 1)) != 0,
            end: (flags & (1 << 2)) != 0,
        })
    }
}

pub struct RpcResponseDeviceRead {
    pub error: RpcDeviceErrorCode,
    pub reason: RpcDeviceReadReason,
    pub data: Vec<u8>,
}
impl RpcResponseDeviceRead {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            error: RpcDeviceErrorCode::unpack(src)?,
            reason: RpcDeviceReadReason::unpack(src)?,
            data: xdr::unpack_opaque(src)?,
        })
    }
}

/// Shared by every Device Core call that only takes a link id, a lock wait, and an
/// I/O timeout: `device_clear`, `device_trigger`, `device_local`, `device_remote`.
pub struct RpcRequestGeneric {
    pub lid: i32,
    pub flags: RpcOperationFlags,
    pub lock_timeout: u32,
    pub io_timeout: u32,
}
impl XdrPack for RpcRequestGeneric {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
        self.flags.pack_xdr(out);
        self.lock_timeout.pack_xdr(out);
        self.io_timeout.pack_xdr(out);
    }
}

pub struct RpcResponseGeneric {
    pub error: RpcDeviceErrorCode,
}
impl RpcResponseGeneric {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            error: RpcDeviceErrorCode::unpack(src)?,
        })
    }
}

pub struct RpcRequestDeviceLock {
    pub lid: i32,
    pub flags: RpcOperationFlags,
    pub lock_timeout: u32,
}
impl XdrPack for RpcRequestDeviceLock {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
        self.flags.pack_xdr(out);
        self.lock_timeout.pack_xdr(out);
    }
}

pub struct RpcRequestDeviceUnlock {
    pub lid: i32,
}
impl XdrPack for RpcRequestDeviceUnlock {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
    }
}

pub struct RpcRequestDestroyLink {
    pub lid: i32,
}
impl XdrPack for RpcRequestDestroyLink {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
    }
}

pub struct RpcResponseDeviceReadStb {
    pub error: RpcDeviceErrorCode,
    pub stb: u8,
}
impl RpcResponseDeviceReadStb {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            error: RpcDeviceErrorCode::unpack(src)?,
            stb: xdr::unpack_u32(src)? as u8,
        })
    }
}

pub struct RpcRequestDeviceEnableSrq {
    pub lid: i32,
    pub enable: bool,
    /// Opaque handle echoed back in `device_intr_srq` notifications.
    pub handle: Vec<u8>,
}
impl XdrPack for RpcRequestDeviceEnableSrq {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
        self.enable.pack_xdr(out);
        self.handle.pack_xdr(out);
    }
}

/// `device_abort`, sent on the separate Abort channel connection.
pub struct RpcRequestDeviceAbort {
    pub lid: i32,
}
impl XdrPack for RpcRequestDeviceAbort {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.lid.pack_xdr(out);
    }
}
