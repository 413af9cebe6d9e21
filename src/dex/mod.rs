#[macro_use]
pub mod error;

pub mod class_data;
pub mod debug_info;
pub mod dex_file;
pub mod flags;
pub mod header;
pub(crate) mod leb;
pub mod signature;
pub mod strings;

pub use crate::dex::dex_file::DexFile;

use crate::dex::error::{DexError, ErrorKind};
use crate::dex::leb::{decode_sleb128, decode_uleb128, decode_uleb128p1};

/// Returns `ix..ix+len` when the whole range lies within `bytes`.
pub(crate) fn checked_range(bytes: &[u8], ix: usize, len: usize) -> Result<std::ops::Range<usize>, DexError>
{
    match ix.checked_add(len)
    {
        Some(end) if end <= bytes.len() => Ok(ix..end),
        _ => Err(err!(Bounds, "range 0x{:x}+{} outside buffer of {} bytes", ix, len, bytes.len())),
    }
}

// Basic type reading
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    let r = checked_range(bytes, *ix, 1)?;
    *ix = r.end;
    Ok(bytes[r.start])
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    let r = checked_range(bytes, *ix, 2)?;
    let result = u16::from_le_bytes([bytes[r.start], bytes[r.start + 1]]);
    *ix = r.end;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let r = checked_range(bytes, *ix, 4)?;
    let result = u32::from_le_bytes([bytes[r.start], bytes[r.start + 1], bytes[r.start + 2], bytes[r.start + 3]]);
    *ix = r.end;
    Ok(result)
}

fn tail(bytes: &[u8], ix: usize) -> Result<&[u8], DexError>
{
    bytes.get(ix..).ok_or_else(|| err!(Bounds, "cursor 0x{:x} past end of {} byte buffer", ix, bytes.len()))
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let (val, size) = decode_uleb128(tail(bytes, *ix)?)?;
    *ix += size;
    Ok(val)
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let (val, size) = decode_sleb128(tail(bytes, *ix)?)?;
    *ix += size;
    Ok(val)
}

pub(crate) fn read_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let (val, size) = decode_uleb128p1(tail(bytes, *ix)?)?;
    *ix += size;
    Ok(val)
}

/// Clamps an untrusted element count so that `count * min_entry_size` never
/// exceeds the bytes left after `ix`.
pub(crate) fn clamp_count(bytes: &[u8], ix: usize, count: u32, min_entry_size: usize) -> u32
{
    let left = bytes.len().saturating_sub(ix);
    let fits = left / min_entry_size.max(1);
    (count as usize).min(fits) as u32
}
