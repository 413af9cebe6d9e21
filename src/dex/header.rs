//! DEX header and magic validation

use log::{debug, warn};
use nom::bytes::complete::take;
use nom::number::complete::le_u32;
use nom::IResult;

use crate::dex::error::DexError;

pub const HEADER_SIZE: usize = 0x70;
pub const MAGIC_PREFIX: &[u8; 4] = b"dex\n";
pub const ENDIAN_CONSTANT: u32 = 0x12345678;

/// Version tags accepted verbatim: M3/M5 previews, the base format, the
/// jumbo-opcode format (ICS+) and the invoke-polymorphic format (API 26+).
pub const KNOWN_VERSIONS: [&[u8; 3]; 4] = [b"009", b"035", b"036", b"038"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicVersion
{
    /// `dex\n` + one of `KNOWN_VERSIONS` + NUL
    Known(u16),
    /// Anything else after `dex\n`; accepted for forward compatibility
    Unrecognized,
}

/// Checks the 8-byte magic.
///
/// The `dex\n` prefix fallback is a policy choice: newer containers with an
/// unlisted version tag still load.
pub fn validate(bytes: &[u8]) -> Result<MagicVersion, DexError>
{
    if bytes.len() < 8
    {
        fail!(Structural, "buffer of {} bytes is too short for the DEX magic", bytes.len());
    }

    for version in KNOWN_VERSIONS
    {
        if bytes[..4] == MAGIC_PREFIX[..] && bytes[4..7] == version[..] && bytes[7] == 0
        {
            let n = version.iter().fold(0u16, |acc, d| acc * 10 + (d - b'0') as u16);
            return Ok(MagicVersion::Known(n));
        }
    }

    if bytes[..4] == MAGIC_PREFIX[..]
    {
        debug!("unrecognized DEX version tag {:02x?}, accepting on prefix", &bytes[4..8]);
        return Ok(MagicVersion::Unrecognized);
    }

    fail!(Structural, "invalid DEX magic {:02x?}", &bytes[..8])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

fn parse_header(i: &[u8]) -> IResult<&[u8], Header>
{
    let (i, magic) = take(8usize)(i)?;
    let (i, checksum) = le_u32(i)?;
    let (i, signature) = take(20usize)(i)?;
    let (i, file_size) = le_u32(i)?;
    let (i, header_size) = le_u32(i)?;
    let (i, endian_tag) = le_u32(i)?;
    let (i, link_size) = le_u32(i)?;
    let (i, link_off) = le_u32(i)?;
    let (i, map_off) = le_u32(i)?;
    let (i, string_ids_size) = le_u32(i)?;
    let (i, string_ids_off) = le_u32(i)?;
    let (i, type_ids_size) = le_u32(i)?;
    let (i, type_ids_off) = le_u32(i)?;
    let (i, proto_ids_size) = le_u32(i)?;
    let (i, proto_ids_off) = le_u32(i)?;
    let (i, field_ids_size) = le_u32(i)?;
    let (i, field_ids_off) = le_u32(i)?;
    let (i, method_ids_size) = le_u32(i)?;
    let (i, method_ids_off) = le_u32(i)?;
    let (i, class_defs_size) = le_u32(i)?;
    let (i, class_defs_off) = le_u32(i)?;
    let (i, data_size) = le_u32(i)?;
    let (i, data_off) = le_u32(i)?;

    let mut m = [0u8; 8];
    m.copy_from_slice(magic);
    let mut s = [0u8; 20];
    s.copy_from_slice(signature);

    Ok((i, Header {
        magic: m,
        checksum,
        signature: s,
        file_size,
        header_size,
        endian_tag,
        link_size,
        link_off,
        map_off,
        string_ids_size,
        string_ids_off,
        type_ids_size,
        type_ids_off,
        proto_ids_size,
        proto_ids_off,
        field_ids_size,
        field_ids_off,
        method_ids_size,
        method_ids_off,
        class_defs_size,
        class_defs_off,
        data_size,
        data_off,
    }))
}

impl Header
{
    /// Reads the fixed header. A container shorter than the header is read as
    /// if zero-padded, which leaves every pool empty instead of failing the load.
    pub fn read(bytes: &[u8]) -> Result<Header, DexError>
    {
        let mut raw = [0u8; HEADER_SIZE];
        let n = bytes.len().min(HEADER_SIZE);
        raw[..n].copy_from_slice(&bytes[..n]);
        if n < HEADER_SIZE
        {
            warn!("container is {} bytes, shorter than the 0x70 byte header", bytes.len());
        }

        let (_, header) = parse_header(&raw)?;
        if header.endian_tag != ENDIAN_CONSTANT && n == HEADER_SIZE
        {
            debug!("unexpected endian tag 0x{:08x}", header.endian_tag);
        }
        Ok(header)
    }

    /// Declared version number from the magic, when it is three ASCII digits
    pub fn version(&self) -> Option<u32>
    {
        let digits = &self.magic[4..7];
        if digits.iter().all(u8::is_ascii_digit)
        {
            Some(digits.iter().fold(0u32, |acc, d| acc * 10 + (d - b'0') as u32))
        }
        else { None }
    }

    /// Whether `off` lies strictly inside the declared data section
    pub fn in_data_section(&self, off: u32) -> bool
    {
        let end = self.data_off as u64 + self.data_size as u64;
        (self.data_off as u64) < off as u64 && (off as u64) < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_versions()
    {
        assert_eq!(validate(b"dex\n035\0").unwrap(), MagicVersion::Known(35));
        assert_eq!(validate(b"dex\n036\0").unwrap(), MagicVersion::Known(36));
        assert_eq!(validate(b"dex\n038\0").unwrap(), MagicVersion::Known(38));
        assert_eq!(validate(b"dex\n009\0").unwrap(), MagicVersion::Known(9));
    }

    #[test]
    fn accepts_prefix_fallback()
    {
        assert_eq!(validate(b"dex\n039\0").unwrap(), MagicVersion::Unrecognized);
        assert_eq!(validate(b"dex\nzzzz").unwrap(), MagicVersion::Unrecognized);
    }

    #[test]
    fn rejects_bad_magic()
    {
        for bad in [&b"dey\n035\0"[..], b"DEX\n035\0", b"dex\n03", b"", b"\0\0\0\0\0\0\0\0"]
        {
            let e = validate(bad).unwrap_err();
            assert!(e.is_structural(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn short_header_reads_as_empty()
    {
        let h = Header::read(b"dex\n035\0").unwrap();
        assert_eq!(h.version(), Some(35));
        assert_eq!(h.string_ids_size, 0);
        assert_eq!(h.class_defs_off, 0);
    }

    #[test]
    fn reads_fields_in_order()
    {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[..8].copy_from_slice(b"dex\n035\0");
        bytes[0x38..0x3c].copy_from_slice(&7u32.to_le_bytes()); // string_ids_size
        bytes[0x3c..0x40].copy_from_slice(&0x70u32.to_le_bytes());
        bytes[0x68..0x6c].copy_from_slice(&0x20u32.to_le_bytes()); // data_size
        bytes[0x6c..0x70].copy_from_slice(&0x100u32.to_le_bytes());
        let h = Header::read(&bytes).unwrap();
        assert_eq!(h.string_ids_size, 7);
        assert_eq!(h.string_ids_off, 0x70);
        assert_eq!(h.data_size, 0x20);
        assert_eq!(h.data_off, 0x100);
        assert!(h.in_data_section(0x101));
        assert!(!h.in_data_section(0x100));
        assert!(!h.in_data_section(0x120));
    }
}
