//! RPC message framing types, RFC5531.

use std::mem;

use crate::error::{Error, Result};

use super::xdr::{self, XdrPack};

pub const RPC_VERSION: u32 = 2;

#[derive(Debug)]
pub enum AuthStat {
    AuthOk,
    AuthBadCred,
    AuthRejectedCred,
    AuthBadVerf,
    AuthRejectedVerf,
    AuthTooWeak,
    AuthInvalidResp,
    AuthFailed,
    Other(u32),
}
impl AuthStat {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(match xdr::unpack_u32(src)? {
            0 => Self::AuthOk,
            1 => Self::AuthBadCred,
            2 => Self::AuthRejectedCred,
            3 => Self::AuthBadVerf,
            4 => Self::AuthRejectedVerf,
            5 => Self::AuthTooWeak,
            6 => Self::AuthInvalidResp,
            7 => Self::AuthFailed,
            other => Self::Other(other),
        })
    }
}
impl std::fmt::Display for AuthStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug)]
pub enum MessageBody {
    Call(CallBody),
    Reply(ReplyBody),
}
impl MessageBody {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        match xdr::unpack_u32(src)? {
            0 => Ok(Self::Call(CallBody::unpack(src)?)),
            1 => Ok(Self::Reply(ReplyBody::unpack(src)?)),
            i => Err(Error::BadResponse(format!("unknown message type {i}"))),
        }
    }
}
impl XdrPack for MessageBody {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        match self {
            Self::Call(call) => {
                0u32.pack_xdr(out);
                call.pack_xdr(out);
            }
            Self::Reply(_) => unimplemented!("this client never packs replies"),
        }
    }
}

#[derive(Debug)]
pub struct RpcMessage {
    pub xid: u32,
    pub body: MessageBody,
}
impl RpcMessage {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            xid: xdr::unpack_u32(src)?,
            body: MessageBody::unpack(src)?,
        })
    }

    /// Unwraps a reply down to its result payload, turning every non-success case
    /// into the matching `Error` variant (SPEC_FULL.md §4.2).
    pub fn into_success_result(self) -> Result<Vec<u8>> {
        let MessageBody::Reply(reply) = self.body else {
            return Err(Error::BadResponse("expected a reply message".into()));
        };

        let accepted = match reply {
            ReplyBody::Rejected(RejectedReplyBody::Mismatch(m)) => {
                return Err(Error::RpcMismatch { low: m.low, high: m.high });
            }
            ReplyBody::Rejected(RejectedReplyBody::AuthError(stat)) => {
                return Err(Error::RpcAuthError(stat.to_string()));
            }
            ReplyBody::Accepted(accepted) => accepted,
        };

        match accepted.body {
            AcceptedReplyBodyType::Success(success) => Ok(success.results),
            AcceptedReplyBodyType::ProgUnavail => {
                Err(Error::BadResponse("RPC program unavailable".into()))
            }
            AcceptedReplyBodyType::ProgMismatch(m) => {
                Err(Error::RpcMismatch { low: m.low, high: m.high })
            }
            AcceptedReplyBodyType::ProcUnavail => Err(Error::RpcProcUnavailable),
            AcceptedReplyBodyType::GarbageArgs => Err(Error::RpcGarbageArgs),
            AcceptedReplyBodyType::SystemErr => {
                Err(Error::BadResponse("RPC server reported a system error".into()))
            }
        }
    }
}
impl XdrPack for RpcMessage {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.xid.pack_xdr(out);
        self.body.pack_xdr(out);
    }
}

#[derive(Debug)]
pub struct CallBody {
    pub rpc_version: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: OpaqueAuth,
    pub verf: OpaqueAuth,
    pub args: Vec<u8>,
}
impl CallBody {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            rpc_version: xdr::unpack_u32(src)?,
            prog: xdr::unpack_u32(src)?,
            vers: xdr::unpack_u32(src)?,
            proc: xdr::unpack_u32(src)?,
            cred: OpaqueAuth::unpack(src)?,
            verf: OpaqueAuth::unpack(src)?,
            args: xdr::unpack_opaque(src)?,
        })
    }
}
impl XdrPack for CallBody {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.rpc_version.pack_xdr(out);
        self.prog.pack_xdr(out);
        self.vers.pack_xdr(out);
        self.proc.pack_xdr(out);
        self.cred.pack_xdr(out);
        self.verf.pack_xdr(out);
        out.extend(self.args);
    }
}

#[derive(Debug)]
pub enum ReplyBody {
    Accepted(AcceptedReplyBody),
    Rejected(RejectedReplyBody),
}
impl ReplyBody {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        match xdr::unpack_u32(src)? {
            0 => Ok(Self::Accepted(AcceptedReplyBody::unpack(src)?)),
            1 => Ok(Self::Rejected(RejectedReplyBody::unpack(src)?)),
            i => Err(Error::BadResponse(format!("unknown reply type {i}"))),
        }
    }
}

#[derive(Debug)]
pub struct AcceptedReplyBody {
    pub verf: OpaqueAuth,
    pub body: AcceptedReplyBodyType,
}
impl AcceptedReplyBody {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            verf: OpaqueAuth::unpack(src)?,
            body: AcceptedReplyBodyType::unpack(src)?,
        })
    }
}

#[derive(Debug)]
pub enum AcceptedReplyBodyType {
    Success(SuccessAcceptedReplyBody),
    ProgUnavail,
    ProgMismatch(ProgMismatchBody),
    ProcUnavail,
    GarbageArgs,
    SystemErr,
}
impl AcceptedReplyBodyType {
    fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        match xdr::unpack_u32(src)? {
            0 => Ok(Self::Success(SuccessAcceptedReplyBody::unpack(src)?)),
            1 => Ok(Self::ProgUnavail),
            2 => Ok(Self::ProgMismatch(ProgMismatchBody::unpack(src)?)),
            3 => Ok(Self::ProcUnavail),
            4 => Ok(Self::GarbageArgs),
            5 => Ok(Self::SystemErr),
            i => Err(Error::BadResponse(format!("unknown accepted-reply type {i}"))),
        }
    }
}

#[derive(Debug)]
pub struct SuccessAcceptedReplyBody {
    pub results: Vec<u8>,
}
impl SuccessAcceptedReplyBody {
    fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self { results: mem::take(src) })
    }
}

#[derive(Debug)]
pub struct ProgMismatchBody {
    pub low: u32,
    pub high: u32,
}
impl ProgMismatchBody {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            low: xdr::unpack_u32(src)?,
            high: xdr::unpack_u32(src)?,
        })
    }
}

#[derive(Debug)]
pub enum RejectedReplyBody {
    Mismatch(ProgMismatchBody),
    AuthError(AuthStat),
}
impl RejectedReplyBody {
    fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        match xdr::unpack_u32(src)? {
            0 => Ok(Self::Mismatch(ProgMismatchBody::unpack(src)?)),
            1 => Ok(Self::AuthError(AuthStat::unpack(src)?)),
            i => Err(Error::BadResponse(format!("unknown rejected-reply type {i}"))),
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug)]
pub enum AuthFlavor {
    Null = 0,
    Sys = 1,
    Short = 2,
    Dh = 3,
    RpcSecGss = 4,
}

#[derive(Debug)]
pub struct OpaqueAuth {
    pub flavor: AuthFlavor,
    pub body: Vec<u8>,
}
impl OpaqueAuth {
    pub fn unpack(src: &mut Vec<u8>) -> Result<Self> {
        Ok(Self {
            flavor: match xdr::unpack_u32(src)? {
                0 => AuthFlavor::Null,
                1 => AuthFlavor::Sys,
                2 => AuthFlavor::Short,
                3 => AuthFlavor::Dh,
                4 => AuthFlavor::RpcSecGss,
                i => return Err(Error::BadResponse(format!("unknown auth flavor {i}"))),
            },
            body: xdr::unpack_opaque(src)?,
        })
    }

    pub fn new_null() -> Self {
        Self {
            flavor: AuthFlavor::Null,
            body: vec![],
        }
    }
}
impl XdrPack for OpaqueAuth {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        (self.flavor as u32).pack_xdr(out);
        self.body.pack_xdr(out);
    }
}
