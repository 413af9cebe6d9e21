/* Dex container: header, index pools and bounds-checked accessors */

use log::{debug, warn};
use nom::combinator::map;
use nom::multi::count;
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;

use std::fs;
use std::path::Path;

use crate::dex::error::{DexError, ErrorKind};
use crate::dex::header::{validate, Header, MagicVersion};
use crate::dex::strings::decode_string;

pub const STRING_ID_SIZE: usize = 4;
pub const TYPE_ID_SIZE: usize = 4;
pub const PROTO_ID_SIZE: usize = 12;
pub const FIELD_ID_SIZE: usize = 8;
pub const METHOD_ID_SIZE: usize = 8;
pub const CLASS_DEF_SIZE: usize = 32;

type StringId = u32;
type TypeId = u32;

/// Location of one index pool after clamping against the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pool
{
    pub offset: u32,
    pub count: u32,
}

impl Pool
{
    /// Applies the single clamp-then-check policy used for every pool: a start
    /// past the buffer empties the pool, otherwise the count is cut down to the
    /// number of whole records between the start and the end of the buffer.
    pub fn clamped(name: &str, offset: u32, declared: u32, record_size: usize, buffer_len: usize) -> Pool
    {
        let start = offset as usize;
        if start > buffer_len
        {
            if declared > 0 {
                warn!("{} pool at 0x{:x} starts past the end of the buffer, forcing it empty", name, offset);
            }
            return Pool { offset, count: 0 };
        }

        let fits = (buffer_len - start) / record_size;
        let count = (declared as usize).min(fits) as u32;
        if count < declared
        {
            warn!("{} pool declares {} entries, only {} fit in the buffer", name, declared, count);
        }
        Pool { offset, count }
    }

    /// Absolute offset of record `idx`, if it is inside the pool
    pub fn record_offset(&self, idx: u32, record_size: usize) -> Option<u64>
    {
        if idx < self.count {
            Some(self.offset as u64 + idx as u64 * record_size as u64)
        } else { None }
    }

    pub fn end(&self, record_size: usize) -> u64
    {
        self.offset as u64 + self.count as u64 * record_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeIdItem {
    pub descriptor_idx: StringId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoIdItem {
    pub shorty_idx: StringId,
    pub return_type_idx: TypeId,
    /// 0 means no parameters
    pub parameters_off: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIdItem {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: StringId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodIdItem {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: StringId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDefItem {
    pub class_idx: TypeId,
    pub access_flags: u32,
    pub superclass_idx: TypeId,
    pub interfaces_off: u32,
    pub source_file_idx: StringId,
    pub annotations_off: u32,
    /// 0 means the class has no members
    pub class_data_off: u32,
    pub static_values_off: u32,
}

fn string_id(i: &[u8]) -> IResult<&[u8], u32>
{
    le_u32(i)
}

fn type_id(i: &[u8]) -> IResult<&[u8], TypeIdItem>
{
    map(le_u32, |descriptor_idx| TypeIdItem { descriptor_idx })(i)
}

fn proto_id(i: &[u8]) -> IResult<&[u8], ProtoIdItem>
{
    map(tuple((le_u32, le_u32, le_u32)), |(shorty_idx, return_type_idx, parameters_off)| {
        ProtoIdItem { shorty_idx, return_type_idx, parameters_off }
    })(i)
}

fn field_id(i: &[u8]) -> IResult<&[u8], FieldIdItem>
{
    map(tuple((le_u16, le_u16, le_u32)), |(class_idx, type_idx, name_idx)| {
        FieldIdItem { class_idx, type_idx, name_idx }
    })(i)
}

fn method_id(i: &[u8]) -> IResult<&[u8], MethodIdItem>
{
    map(tuple((le_u16, le_u16, le_u32)), |(class_idx, proto_idx, name_idx)| {
        MethodIdItem { class_idx, proto_idx, name_idx }
    })(i)
}

fn class_def(i: &[u8]) -> IResult<&[u8], ClassDefItem>
{
    map(
        tuple((le_u32, le_u32, le_u32, le_u32, le_u32, le_u32, le_u32, le_u32)),
        |(class_idx, access_flags, superclass_idx, interfaces_off, source_file_idx, annotations_off, class_data_off, static_values_off)| {
            ClassDefItem {
                class_idx,
                access_flags,
                superclass_idx,
                interfaces_off,
                source_file_idx,
                annotations_off,
                class_data_off,
                static_values_off,
            }
        },
    )(i)
}

/// Reads all records of a clamped pool. The clamp guarantees every record
/// fits, so a parse failure here only happens on an inconsistent pool and
/// yields an empty table.
fn read_table<T, F>(bytes: &[u8], pool: &Pool, name: &str, parser: F) -> Vec<T>
where
    F: FnMut(&[u8]) -> IResult<&[u8], T>,
{
    if pool.count == 0 {
        return vec![];
    }
    let input = match bytes.get(pool.offset as usize..) {
        Some(input) => input,
        None => return vec![],
    };
    match count(parser, pool.count as usize)(input)
    {
        Ok((_, table)) => table,
        Err(e) => {
            let e: DexError = e.into();
            warn!("{} table unreadable: {}", name, e);
            vec![]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pools
{
    pub strings: Pool,
    pub types: Pool,
    pub protos: Pool,
    pub fields: Pool,
    pub methods: Pool,
    pub class_defs: Pool,
}

impl Pools
{
    fn from_header(header: &Header, len: usize) -> Pools
    {
        Pools {
            strings: Pool::clamped("string_ids", header.string_ids_off, header.string_ids_size, STRING_ID_SIZE, len),
            types: Pool::clamped("type_ids", header.type_ids_off, header.type_ids_size, TYPE_ID_SIZE, len),
            protos: Pool::clamped("proto_ids", header.proto_ids_off, header.proto_ids_size, PROTO_ID_SIZE, len),
            fields: Pool::clamped("field_ids", header.field_ids_off, header.field_ids_size, FIELD_ID_SIZE, len),
            methods: Pool::clamped("method_ids", header.method_ids_off, header.method_ids_size, METHOD_ID_SIZE, len),
            class_defs: Pool::clamped("class_defs", header.class_defs_off, header.class_defs_size, CLASS_DEF_SIZE, len),
        }
    }
}

/// A loaded DEX container. Every table is built once at load time and never
/// changes afterwards.
#[derive(Debug)]
pub struct DexFile {
    pub header: Header,
    pub version: MagicVersion,
    pub pools: Pools,
    data: Vec<u8>,
    string_offsets: Vec<u32>,
    strings: Vec<Option<String>>,
    types: Vec<TypeIdItem>,
    prototypes: Vec<ProtoIdItem>,
    fields: Vec<FieldIdItem>,
    methods: Vec<MethodIdItem>,
    class_defs: Vec<ClassDefItem>,
}

impl DexFile {

    pub fn from_vec(data: Vec<u8>) -> Result<DexFile, DexError>
    {
        let version = validate(&data)?;
        let header = Header::read(&data)?;
        let pools = Pools::from_header(&header, data.len());

        // Read the strings
        let string_offsets: Vec<u32> = read_table(&data, &pools.strings, "string_ids", string_id);
        let strings: Vec<Option<String>> = string_offsets
            .iter()
            .enumerate()
            .map(|(i, off)| {
                let s = decode_string(&data, *off);
                if s.is_none() {
                    debug!("string #{} at 0x{:x} voided", i, off);
                }
                s
            })
            .collect();

        let types = read_table(&data, &pools.types, "type_ids", type_id);
        let prototypes = read_table(&data, &pools.protos, "proto_ids", proto_id);
        let fields = read_table(&data, &pools.fields, "field_ids", field_id);
        let methods = read_table(&data, &pools.methods, "method_ids", method_id);
        let class_defs = read_table(&data, &pools.class_defs, "class_defs", class_def);

        Ok(DexFile {
            header,
            version,
            pools,
            data,
            string_offsets,
            strings,
            types,
            prototypes,
            fields,
            methods,
            class_defs,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<DexFile, DexError>
    {
        DexFile::from_vec(bytes.to_vec())
    }

    pub fn from_file(path: &Path) -> Result<DexFile, DexError>
    {
        let bytes = fs::read(path).map_err(|e| err!(Structural, "io Error: {}", e))?;
        DexFile::from_vec(bytes)
    }

    pub fn bytes(&self) -> &[u8]
    {
        &self.data
    }

    pub fn len(&self) -> usize
    {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.data.is_empty()
    }

    /// Decoded string `idx`, absent when the index is out of range or the
    /// string failed validation
    pub fn get_string(&self, idx: StringId) -> Option<&str>
    {
        self.strings.get(idx as usize)?.as_deref()
    }

    /// Absolute offset of the string data for `idx`
    pub fn get_string_offset(&self, idx: StringId) -> Option<u32>
    {
        self.string_offsets.get(idx as usize).copied()
    }

    pub fn get_type(&self, idx: TypeId) -> Option<&TypeIdItem>
    {
        self.types.get(idx as usize)
    }

    pub fn get_proto(&self, idx: u32) -> Option<&ProtoIdItem>
    {
        self.prototypes.get(idx as usize)
    }

    pub fn get_field(&self, idx: u32) -> Option<&FieldIdItem>
    {
        self.fields.get(idx as usize)
    }

    pub fn get_method(&self, idx: u32) -> Option<&MethodIdItem>
    {
        self.methods.get(idx as usize)
    }

    pub fn get_class_def(&self, idx: u32) -> Option<&ClassDefItem>
    {
        self.class_defs.get(idx as usize)
    }

    pub fn string_count(&self) -> usize { self.strings.len() }
    pub fn type_count(&self) -> usize { self.types.len() }
    pub fn proto_count(&self) -> usize { self.prototypes.len() }
    pub fn field_count(&self) -> usize { self.fields.len() }
    pub fn method_count(&self) -> usize { self.methods.len() }
    pub fn class_def_count(&self) -> usize { self.class_defs.len() }

    pub fn methods(&self) -> &[MethodIdItem]
    {
        &self.methods
    }

    pub fn class_defs(&self) -> &[ClassDefItem]
    {
        &self.class_defs
    }

    pub(crate) fn string_slots(&self) -> impl Iterator<Item = (u32, u32, Option<&str>)>
    {
        self.string_offsets
            .iter()
            .zip(self.strings.iter())
            .enumerate()
            .map(|(i, (off, s))| (i as u32, *off, s.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_clamps_to_buffer()
    {
        let p = Pool::clamped("t", 0x70, 1_000_000, 4, 0x80);
        assert_eq!(p.count, 4);
        let p = Pool::clamped("t", 0x90, 3, 4, 0x80);
        assert_eq!(p.count, 0);
        let p = Pool::clamped("t", 0x80, 3, 4, 0x80);
        assert_eq!(p.count, 0);
        let p = Pool::clamped("t", 0x70, 2, 8, 0x80);
        assert_eq!(p.count, 2);
        assert_eq!(p.record_offset(1, 8), Some(0x78));
        assert_eq!(p.record_offset(2, 8), None);
        assert_eq!(p.end(8), 0x80);
    }

    #[test]
    fn magic_only_container_loads_empty()
    {
        let dex = DexFile::from_bytes(b"dex\n035\0").unwrap();
        assert_eq!(dex.string_count(), 0);
        assert_eq!(dex.class_def_count(), 0);
        assert!(dex.get_string(0).is_none());
        assert!(dex.get_type(0).is_none());
        assert!(dex.get_proto(0).is_none());
        assert!(dex.get_field(0).is_none());
        assert!(dex.get_method(0).is_none());
        assert!(dex.get_class_def(0).is_none());
    }

    #[test]
    fn bad_magic_is_structural()
    {
        let e = DexFile::from_bytes(b"PK\x03\x04\0\0\0\0").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Structural);
    }

    #[test]
    fn huge_declared_counts_do_not_allocate()
    {
        let mut bytes = vec![0u8; 0x70];
        bytes[..8].copy_from_slice(b"dex\n035\0");
        // every size field claims u32::MAX entries starting at the header end
        for off in (0x38..0x68).step_by(8) {
            bytes[off..off + 4].copy_from_slice(&u32::MAX.to_le_bytes());
            bytes[off + 4..off + 8].copy_from_slice(&0x70u32.to_le_bytes());
        }
        let dex = DexFile::from_bytes(&bytes).unwrap();
        assert_eq!(dex.string_count(), 0);
        assert_eq!(dex.method_count(), 0);
        assert_eq!(dex.pools.class_defs.count, 0);
    }

    #[test]
    fn reads_id_records()
    {
        let rec = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
        let (_, f) = field_id(&rec).unwrap();
        assert_eq!(f, FieldIdItem { class_idx: 1, type_idx: 2, name_idx: 3 });
        let (_, m) = method_id(&rec).unwrap();
        assert_eq!(string_id(&rec).unwrap().1, 0x0002_0001);
        assert_eq!(m, MethodIdItem { class_idx: 1, proto_idx: 2, name_idx: 3 });
        assert!(class_def(&rec).is_err());
    }
}
