/* class_data_item stream and the code items it points to */

use log::{debug, warn};
use serde::Serialize;

use crate::dex::error::{DexError, ErrorKind};
use crate::dex::{checked_range, clamp_count, read_sleb128, read_u2, read_u4, read_uleb128};

/// Fixed part of a code_item before the instruction stream
pub const CODE_ITEM_HEADER_SIZE: u32 = 16;
pub const TRY_ITEM_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedTypeAddrPair {
    pub type_idx: u32,
    pub addr: u32,
}

impl EncodedTypeAddrPair {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedTypeAddrPair, DexError> {
        let type_idx = read_uleb128(bytes, ix)?;
        let addr = read_uleb128(bytes, ix)?;
        Ok(EncodedTypeAddrPair { type_idx, addr })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_off: u16, // offset (in bytes) into the encoded_catch_handler_list
}

impl TryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TryItem, DexError> {
        Ok(TryItem {
            start_addr: read_u4(bytes, ix)?,
            insn_count: read_u2(bytes, ix)?,
            handler_off: read_u2(bytes, ix)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedCatchHandler {
    /// Byte offset from the start of the handler list, matched by `TryItem::handler_off`
    pub offset: u32,
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    /// A positive size gives that many typed pairs; zero or negative gives
    /// `|size|` pairs followed by a catch-all address.
    pub fn read(bytes: &[u8], ix: &mut usize, offset: u32) -> Result<EncodedCatchHandler, DexError> {
        let size = read_sleb128(bytes, ix)?;
        let declared = size.unsigned_abs();
        // each pair takes at least two bytes
        let count = clamp_count(bytes, *ix, declared, 2);
        if count < declared {
            fail!(ResourceLimit, "catch handler declares {} pairs with {} bytes left", declared, bytes.len().saturating_sub(*ix));
        }
        let mut pairs = Vec::with_capacity(count as usize);
        for _ in 0..count { pairs.push(EncodedTypeAddrPair::read(bytes, ix)?); }
        let catch_all_addr = if size <= 0 { Some(read_uleb128(bytes, ix)?) } else { None };
        Ok(EncodedCatchHandler { offset, handlers: pairs, catch_all_addr })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeItem
{
    /// Absolute offset of the code_item
    pub offset: u32,
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    /// In 16-bit code units
    pub insns_size: u32,
    pub tries: Vec<TryItem>,
    pub handlers: Vec<EncodedCatchHandler>,
}

impl CodeItem
{
    /// Reads the code_item at `offset`.
    ///
    /// The header and the instruction region must lie inside the buffer or the
    /// whole item is rejected. A broken try table or handler list only loses
    /// the exception information: what decoded cleanly is kept.
    pub fn read(bytes: &[u8], offset: u32) -> Result<CodeItem, DexError>
    {
        let code_item_start = offset as usize;
        let mut ix = code_item_start;
        checked_range(bytes, ix, CODE_ITEM_HEADER_SIZE as usize)?;
        let registers_size = read_u2(bytes, &mut ix)?;
        let ins_size = read_u2(bytes, &mut ix)?;
        let outs_size = read_u2(bytes, &mut ix)?;
        let tries_size = read_u2(bytes, &mut ix)?;
        let debug_info_off = read_u4(bytes, &mut ix)?;
        let insns_size = read_u4(bytes, &mut ix)?;

        let insns_len = insns_size as usize * 2;
        let insns = checked_range(bytes, ix, insns_len)
            .map_err(|e| DexError::with_context(e, format!("instructions of code item at 0x{:x}", code_item_start)))?;
        ix = insns.end;

        let mut code = CodeItem {
            offset,
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns_size,
            tries: vec![],
            handlers: vec![],
        };

        if tries_size > 0
        {
            // Optional 2-byte padding if there are tries and insns_size is odd
            if (insns_size & 1) != 0 { ix += 2; }
            if let Err(e) = code.read_tries(bytes, ix) {
                warn!("[codeitem] exception table at 0x{:x} dropped: {}", code_item_start, e);
            }
        }
        Ok(code)
    }

    fn read_tries(&mut self, bytes: &[u8], mut ix: usize) -> Result<(), DexError>
    {
        checked_range(bytes, ix, self.tries_size as usize * TRY_ITEM_SIZE)?;
        for _ in 0..self.tries_size { self.tries.push(TryItem::read(bytes, &mut ix)?); }

        // encoded_catch_handler_list starts here
        let handlers_base = ix;
        let declared = read_uleb128(bytes, &mut ix)?;
        // an encoded handler is at least one byte
        let handlers_size = clamp_count(bytes, ix, declared, 1);
        if handlers_size < declared {
            debug!("[codeitem] handler list size {} clamped to {}", declared, handlers_size);
        }

        for i in 0..handlers_size
        {
            let entry_off = ix;
            let h = EncodedCatchHandler::read(bytes, &mut ix, (entry_off - handlers_base) as u32)
                .map_err(|e| DexError::with_context(e, format!("catch handler #{}/{} at 0x{:x}", i + 1, handlers_size, entry_off)))?;
            self.handlers.push(h);
        }
        Ok(())
    }

    /// Absolute offset of the first instruction
    pub fn insns_offset(&self) -> u64
    {
        self.offset as u64 + CODE_ITEM_HEADER_SIZE as u64
    }

    /// Instruction stream length in bytes
    pub fn insns_byte_len(&self) -> u64
    {
        self.insns_size as u64 * 2
    }

    pub fn handler_for(&self, t: &TryItem) -> Option<&EncodedCatchHandler>
    {
        self.handlers.iter().find(|h| h.offset == t.handler_off as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemberKind
{
    StaticField,
    InstanceField,
    DirectMethod,
    VirtualMethod,
}

impl MemberKind
{
    pub fn is_field(&self) -> bool
    {
        matches!(self, MemberKind::StaticField | MemberKind::InstanceField)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedField
{
    pub field_idx: u32,
    pub access_flags: u32,
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMethod
{
    pub method_idx: u32,
    pub access_flags: u32,
    /// 0 for abstract and native methods
    pub code_off: u32,
    /// Absolute offset of this encoded_method entry
    pub entry_offset: usize,
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassMember
{
    Field(EncodedField),
    Method(EncodedMethod),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState
{
    ReadCounts,
    ReadStaticFields,
    ReadInstanceFields,
    ReadDirectMethods,
    ReadVirtualMethods,
    Done,
}

impl DecodeState
{
    fn next(self) -> DecodeState
    {
        match self
        {
            DecodeState::ReadCounts => DecodeState::ReadStaticFields,
            DecodeState::ReadStaticFields => DecodeState::ReadInstanceFields,
            DecodeState::ReadInstanceFields => DecodeState::ReadDirectMethods,
            DecodeState::ReadDirectMethods => DecodeState::ReadVirtualMethods,
            DecodeState::ReadVirtualMethods | DecodeState::Done => DecodeState::Done,
        }
    }

    fn member_kind(self) -> Option<MemberKind>
    {
        match self
        {
            DecodeState::ReadStaticFields => Some(MemberKind::StaticField),
            DecodeState::ReadInstanceFields => Some(MemberKind::InstanceField),
            DecodeState::ReadDirectMethods => Some(MemberKind::DirectMethod),
            DecodeState::ReadVirtualMethods => Some(MemberKind::VirtualMethod),
            _ => None,
        }
    }
}

/// Walks one class_data_item, yielding members in stream order.
///
/// A read error is yielded once and ends the iteration; members yielded
/// before it stay valid.
pub struct ClassDataReader<'a>
{
    bytes: &'a [u8],
    ix: usize,
    state: DecodeState,
    counts: [u32; 4],
    remaining: u32,
    last_idx: u32,
    max_methods: Option<u32>,
}

impl<'a> ClassDataReader<'a>
{
    pub fn new(bytes: &'a [u8], offset: u32, max_methods: Option<u32>) -> ClassDataReader<'a>
    {
        ClassDataReader {
            bytes,
            ix: offset as usize,
            state: DecodeState::ReadCounts,
            counts: [0; 4],
            remaining: 0,
            last_idx: 0,
            max_methods,
        }
    }

    pub fn state(&self) -> DecodeState
    {
        self.state
    }

    fn read_counts(&mut self) -> Result<(), DexError>
    {
        for c in self.counts.iter_mut() {
            *c = read_uleb128(self.bytes, &mut self.ix)?;
        }
        Ok(())
    }

    fn enter(&mut self, state: DecodeState)
    {
        self.state = state;
        self.last_idx = 0;
        self.remaining = match state.member_kind()
        {
            Some(kind) => {
                let slot = kind as usize;
                let declared = self.counts[slot];
                let mut n = clamp_count(self.bytes, self.ix, declared, if kind.is_field() { 2 } else { 3 });
                if !kind.is_field() {
                    if let Some(max) = self.max_methods { n = n.min(max); }
                }
                if n < declared {
                    debug!("{:?} count {} clamped to {}", kind, declared, n);
                }
                n
            }
            None => 0,
        };
    }

    fn next_index(&mut self) -> Result<u32, DexError>
    {
        let delta = read_uleb128(self.bytes, &mut self.ix)?;
        let idx = self.last_idx.checked_add(delta)
            .ok_or_else(|| err!(Encoding, "member index overflows at 0x{:x}", self.ix))?;
        self.last_idx = idx;
        Ok(idx)
    }

    fn read_member(&mut self, kind: MemberKind) -> Result<ClassMember, DexError>
    {
        let entry_offset = self.ix;
        let idx = self.next_index()?;
        let access_flags = read_uleb128(self.bytes, &mut self.ix)?;
        if kind.is_field() {
            return Ok(ClassMember::Field(EncodedField { field_idx: idx, access_flags, kind }));
        }
        let code_off = read_uleb128(self.bytes, &mut self.ix)?;
        Ok(ClassMember::Method(EncodedMethod { method_idx: idx, access_flags, code_off, entry_offset, kind }))
    }
}

impl Iterator for ClassDataReader<'_>
{
    type Item = Result<ClassMember, DexError>;

    fn next(&mut self) -> Option<Self::Item>
    {
        loop
        {
            match self.state
            {
                DecodeState::Done => return None,
                DecodeState::ReadCounts => {
                    if let Err(e) = self.read_counts() {
                        self.state = DecodeState::Done;
                        return Some(Err(e));
                    }
                    self.enter(DecodeState::ReadStaticFields);
                }
                state => {
                    if self.remaining == 0 {
                        self.enter(state.next());
                        continue;
                    }
                    self.remaining -= 1;
                    let kind = state.member_kind()?;
                    let member = self.read_member(kind);
                    if member.is_err() {
                        self.state = DecodeState::Done;
                    }
                    return Some(member);
                }
            }
        }
    }
}

/// Fully decoded class_data_item, grouped per category
#[derive(Debug, Default)]
pub struct ClassDataItem {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassDataItem
{
    /// Strict read: any error in the stream fails the whole item.
    pub fn read(bytes: &[u8], offset: u32) -> Result<ClassDataItem, DexError>
    {
        let mut item = ClassDataItem::default();
        for member in ClassDataReader::new(bytes, offset, None)
        {
            match member?
            {
                ClassMember::Field(f) if f.kind == MemberKind::StaticField => item.static_fields.push(f),
                ClassMember::Field(f) => item.instance_fields.push(f),
                ClassMember::Method(m) if m.kind == MemberKind::DirectMethod => item.direct_methods.push(m),
                ClassMember::Method(m) => item.virtual_methods.push(m),
            }
        }
        Ok(item)
    }
}
