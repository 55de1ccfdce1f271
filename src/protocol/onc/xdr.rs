//! External Data Representation (XDR), as defined by RFC4506.

use crate::error::{Error, Result};

pub trait XdrPack {
    /// Consume self, appending its XDR representation to `out`.
    fn pack_xdr(self, out: &mut Vec<u8>);
}

impl XdrPack for u32 {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        out.extend(self.to_be_bytes());
    }
}

impl XdrPack for i32 {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        out.extend(self.to_be_bytes());
    }
}

impl XdrPack for bool {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        (self as u32).pack_xdr(out);
    }
}

impl XdrPack for Vec<u8> {
    /// Only valid for "opaque" data buffers, which are length-prefixed.
    fn pack_xdr(self, out: &mut Vec<u8>) {
        let len = self.len();
        (len as u32).pack_xdr(out);
        out.extend(self);
        if !len.is_multiple_of(4) {
            out.extend(std::iter::repeat_n(0u8, 4 - (len % 4)));
        }
    }
}

impl XdrPack for String {
    fn pack_xdr(self, out: &mut Vec<u8>) {
        self.into_bytes().pack_xdr(out);
    }
}

pub fn unpack_u32(src: &mut Vec<u8>) -> Result<u32> {
    if src.len() < 4 {
        return Err(Error::BadResponse("not enough bytes to read u32".into()));
    }
    let bytes: [u8; 4] = src.drain(0..4).collect::<Vec<_>>().try_into().unwrap();
    Ok(u32::from_be_bytes(bytes))
}

pub fn unpack_i32(src: &mut Vec<u8>) -> Result<i32> {
    unpack_u32(src).map(|v| v as i32)
}

pub fn unpack_u16(src: &mut Vec<u8>) -> Result<u16> {
    let val = unpack_u32(src)?;
    val.try_into()
        .map_err(|_| Error::BadResponse(format!("value {val} does not represent a 16-bit value")))
}

pub fn unpack_opaque(src: &mut Vec<u8>) -> Result<Vec<u8>> {
    let length = unpack_u32(src)? as usize;
    let padding = if !length.is_multiple_of(4) { 4 - (length % 4) } else { 0 };

    if src.len() < length + padding {
        return Err(Error::BadResponse("not enough bytes to read opaque data".into()));
    }

    let res = src.drain(0..length).collect();
    src.drain(0..padding);
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opaque_pads_to_four_bytes() {
        let mut out = vec![];
        vec![1u8, 2, 3].pack_xdr(&mut out);
        assert_eq!(out, vec![0, 0, 0, 3, 1, 2, 3, 0]);
    }

    #[test]
    fn opaque_roundtrip() {
        let mut out = vec![];
        vec![1u8, 2, 3, 4, 5].pack_xdr(&mut out);
        let unpacked = unpack_opaque(&mut out).unwrap();
        assert_eq!(unpacked, vec![1, 2, 3, 4, 5]);
        assert!(out.is_empty());
    }

    #[test]
    fn u32_roundtrip() {
        let mut out = vec![];
        0xdead_beefu32.pack_xdr(&mut out);
        assert_eq!(unpack_u32(&mut out).unwrap(), 0xdead_beef);
    }

    #[test]
    fn truncated_input_is_bad_response() {
        let mut out = vec![0u8, 1];
        assert!(unpack_u32(&mut out).is_err());
    }
}
