use log::debug;

use crate::dex::dex_file::DexFile;
use crate::dex::leb::{decode_uleb128, MAX_LEB128_LEN};
use crate::types::StringRecord;

/// A MUTF-8 sequence encodes one UTF-16 unit in at most 3 bytes
const MAX_BYTES_PER_UNIT: usize = 3;

/// Decodes the `string_data_item` at `offset`.
///
/// The declared length counts UTF-16 units; the string is rejected if the
/// count is zero, cannot fit in the buffer, has no terminator within
/// `3 * count` bytes, or disagrees with the decoded content.
pub fn decode_string(bytes: &[u8], offset: u32) -> Option<String>
{
    let start = offset as usize;
    if start >= bytes.len() {
        return None;
    }

    let window = &bytes[start..bytes.len().min(start + MAX_LEB128_LEN)];
    let (units, leb_len) = decode_uleb128(window).ok()?;
    let units = units as usize;
    let data_start = start + leb_len;
    if units == 0 || data_start >= bytes.len() || units > bytes.len() - data_start {
        return None;
    }

    // the terminator may follow the longest possible encoding
    let limit = bytes.len().min(data_start + units * MAX_BYTES_PER_UNIT + 1);
    let data = &bytes[data_start..limit];
    let nul = data.iter().position(|b| *b == 0)?;

    let value = cesu8::from_java_cesu8(&data[..nul]).ok()?;
    let decoded_units = value.encode_utf16().count();
    if decoded_units != units
    {
        debug!("string at 0x{:x} declares {} units, holds {}", offset, units, decoded_units);
        return None;
    }
    Some(value.into_owned())
}

/// `L…/…` and `[L…` values are type names rather than string constants
pub fn looks_like_class_descriptor(value: &str) -> bool
{
    (value.starts_with('L') && value.contains('/')) || value.starts_with("[L")
}

impl DexFile
{
    /// Resolves a type index to its descriptor string
    pub fn type_descriptor(&self, type_idx: u32) -> Option<&str>
    {
        let t = self.get_type(type_idx)?;
        self.get_string(t.descriptor_idx)
    }

    /// String constants for the host, skipping voided strings and anything
    /// that looks like a class descriptor. Ordinals are 1-based pool positions.
    pub fn string_records(&self) -> Vec<StringRecord>
    {
        self.string_slots()
            .filter_map(|(idx, offset, value)| {
                let value = value?;
                if looks_like_class_descriptor(value) {
                    return None;
                }
                let length = value.encode_utf16().count() as u32;
                let size = cesu8::to_java_cesu8(value).len() as u32;
                Some(StringRecord {
                    value: value.to_string(),
                    address: offset as u64,
                    ordinal: idx + 1,
                    length,
                    size,
                })
            })
            .collect()
    }
}
