/* debug_info_item state machine */

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::dex::dex_file::DexFile;
use crate::dex::error::DexError;
use crate::dex::flags::{ACC_STATIC, NO_INDEX};
use crate::dex::signature::is_wide;
use crate::dex::{clamp_count, read_sleb128, read_u1, read_uleb128, read_uleb128p1};

pub const DBG_END_SEQUENCE: u8 = 0x00;
pub const DBG_ADVANCE_PC: u8 = 0x01;
pub const DBG_ADVANCE_LINE: u8 = 0x02;
pub const DBG_START_LOCAL: u8 = 0x03;
pub const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
pub const DBG_END_LOCAL: u8 = 0x05;
pub const DBG_RESTART_LOCAL: u8 = 0x06;
pub const DBG_SET_PROLOGUE_END: u8 = 0x07;
pub const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
pub const DBG_SET_FILE: u8 = 0x09;
pub const DBG_FIRST_SPECIAL: u8 = 0x0a;
pub const DBG_LINE_BASE: i64 = -4;
pub const DBG_LINE_RANGE: u8 = 15;

/// What the interpreter needs to know about the method owning the program
#[derive(Debug, Clone)]
pub struct DebugContext<'a>
{
    pub debug_info_off: u32,
    pub registers_size: u16,
    pub ins_size: u16,
    /// Instruction count in code units, closes ranges still live at the end
    pub insns_size: u32,
    pub access_flags: u32,
    /// Full descriptor of the declaring class, typed onto `this`
    pub class_descriptor: &'a str,
    pub parameter_types: &'a [&'a str],
    pub source_file_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionRecord
{
    pub source_file_idx: u32,
    /// Method-relative, in code units
    pub address: u32,
    pub line: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalRange
{
    pub register: u16,
    pub name: Option<String>,
    pub descriptor: Option<String>,
    pub signature: Option<String>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Default)]
struct LocalSlot
{
    name: Option<String>,
    descriptor: Option<String>,
    signature: Option<String>,
    start: u32,
    live: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugOutput
{
    pub positions: Vec<PositionRecord>,
    pub locals: Vec<LocalRange>,
    /// False when the program stopped on bad input rather than DBG_END_SEQUENCE
    pub completed: bool,
}

struct Machine<'a>
{
    dex: &'a DexFile,
    ix: usize,
    address: u32,
    line: i64,
    source_file_idx: u32,
    registers_size: u16,
    /// Only registers the program or the arguments touched
    slots: BTreeMap<u16, LocalSlot>,
    out: DebugOutput,
}

impl Machine<'_>
{
    fn register(&mut self) -> Result<u16, DexError>
    {
        let reg = read_uleb128(self.dex.bytes(), &mut self.ix)?;
        if reg >= self.registers_size as u32 {
            fail!(Bounds, "register v{} out of {} registers", reg, self.registers_size);
        }
        Ok(reg as u16)
    }

    fn string_p1(&mut self) -> Result<Option<String>, DexError>
    {
        let idx = read_uleb128p1(self.dex.bytes(), &mut self.ix)?;
        Ok(if idx < 0 { None } else { self.dex.get_string(idx as u32).map(String::from) })
    }

    fn type_p1(&mut self) -> Result<Option<String>, DexError>
    {
        let idx = read_uleb128p1(self.dex.bytes(), &mut self.ix)?;
        Ok(if idx < 0 { None } else { self.dex.type_descriptor(idx as u32).map(String::from) })
    }

    fn emit_if_live(&mut self, reg: u16, end: u32)
    {
        let Some(slot) = self.slots.get(&reg) else { return };
        if slot.live {
            self.out.locals.push(LocalRange {
                register: reg,
                name: slot.name.clone(),
                descriptor: slot.descriptor.clone(),
                signature: slot.signature.clone(),
                start: slot.start,
                end,
            });
        }
    }

    fn start_local(&mut self, extended: bool) -> Result<(), DexError>
    {
        let reg = self.register()?;
        let name = self.string_p1()?;
        let descriptor = self.type_p1()?;
        let signature = if extended { self.string_p1()? } else { None };
        self.emit_if_live(reg, self.address);
        self.slots.insert(reg, LocalSlot { name, descriptor, signature, start: self.address, live: true });
        Ok(())
    }

    fn seed_arguments(&mut self, ctx: &DebugContext) -> Result<(), DexError>
    {
        let dex = self.dex;
        let bytes = dex.bytes();
        let declared = read_uleb128(bytes, &mut self.ix)?;
        // each name takes at least one byte
        let names = clamp_count(bytes, self.ix, declared, 1) as usize;

        if ctx.ins_size > ctx.registers_size {
            fail!(Bounds, "{} ins exceed {} registers", ctx.ins_size, ctx.registers_size);
        }
        let registers = ctx.registers_size as usize;
        let mut arg_reg = (ctx.registers_size - ctx.ins_size) as usize;

        if ctx.access_flags & ACC_STATIC == 0
        {
            if arg_reg < registers {
                self.slots.insert(arg_reg as u16, LocalSlot {
                    name: Some("this".to_string()),
                    descriptor: Some(ctx.class_descriptor.to_string()),
                    signature: None,
                    start: 0,
                    live: true,
                });
            }
            arg_reg += 1;
        }

        for i in 0..names
        {
            let name = self.string_p1()?;
            let ty = match ctx.parameter_types.get(i) {
                Some(ty) => *ty,
                // surplus names only keep the stream aligned
                None => continue,
            };
            if arg_reg >= registers {
                fail!(Bounds, "parameter {} needs register v{} of {}", i, arg_reg, registers);
            }
            let reg = arg_reg as u16;
            arg_reg += if is_wide(ty) { 2 } else { 1 };
            if let Some(name) = name {
                self.slots.insert(reg, LocalSlot {
                    name: Some(name),
                    descriptor: Some(ty.to_string()),
                    signature: None,
                    start: self.address,
                    live: true,
                });
            }
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), DexError>
    {
        loop
        {
            let opcode = read_u1(self.dex.bytes(), &mut self.ix)?;
            match opcode
            {
                DBG_END_SEQUENCE => return Ok(()),
                DBG_ADVANCE_PC => {
                    let diff = read_uleb128(self.dex.bytes(), &mut self.ix)?;
                    self.address = self.address.wrapping_add(diff);
                }
                DBG_ADVANCE_LINE => {
                    let diff = read_sleb128(self.dex.bytes(), &mut self.ix)?;
                    self.line = self.line.wrapping_add(diff as i64);
                }
                DBG_START_LOCAL => self.start_local(false)?,
                DBG_START_LOCAL_EXTENDED => self.start_local(true)?,
                DBG_END_LOCAL => {
                    let reg = self.register()?;
                    self.emit_if_live(reg, self.address);
                    if let Some(slot) = self.slots.get_mut(&reg) {
                        slot.live = false;
                    }
                }
                DBG_RESTART_LOCAL => {
                    let reg = self.register()?;
                    let slot = self.slots.entry(reg).or_default();
                    if !slot.live {
                        slot.start = self.address;
                        slot.live = true;
                    }
                }
                DBG_SET_PROLOGUE_END | DBG_SET_EPILOGUE_BEGIN => {}
                DBG_SET_FILE => {
                    let idx = read_uleb128p1(self.dex.bytes(), &mut self.ix)?;
                    self.source_file_idx = if idx < 0 { NO_INDEX } else { idx as u32 };
                }
                special => {
                    let adjusted = special - DBG_FIRST_SPECIAL;
                    self.address = self.address.wrapping_add((adjusted / DBG_LINE_RANGE) as u32);
                    self.line = self.line.wrapping_add(DBG_LINE_BASE + (adjusted % DBG_LINE_RANGE) as i64);
                    self.out.positions.push(PositionRecord {
                        source_file_idx: self.source_file_idx,
                        address: self.address,
                        line: self.line,
                    });
                }
            }
        }
    }
}

/// Runs the debug program of one method.
///
/// Bad input never fails the call: the machine stops, closes every local that
/// is still live at `insns_size` and returns what it produced so far.
pub fn interpret(dex: &DexFile, ctx: &DebugContext) -> DebugOutput
{
    let mut ix = ctx.debug_info_off as usize;
    let line_start = match read_uleb128(dex.bytes(), &mut ix) {
        Ok(l) => l,
        Err(e) => {
            debug!("debug info at 0x{:x} unreadable: {}", ctx.debug_info_off, e);
            return DebugOutput::default();
        }
    };

    let mut m = Machine {
        dex,
        ix,
        address: 0,
        line: line_start as i64,
        source_file_idx: ctx.source_file_idx,
        registers_size: ctx.registers_size,
        slots: BTreeMap::new(),
        out: DebugOutput::default(),
    };

    let result = m.seed_arguments(ctx).and_then(|_| m.run());
    match result {
        Ok(()) => m.out.completed = true,
        Err(e) => debug!("debug program at 0x{:x} stopped: {}", ctx.debug_info_off, e),
    }

    let live: Vec<u16> = m.slots.iter().filter(|(_, s)| s.live).map(|(r, _)| *r).collect();
    for reg in live {
        m.emit_if_live(reg, ctx.insns_size);
    }
    m.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::class_data::CodeItem;
    use crate::tests::builder::{bare_class, debug_program, CodeSpec, DexBuilder, MethodSpec};

    fn ctx<'a>(off: u32, registers_size: u16, ins_size: u16, access_flags: u32, params: &'a [&'a str]) -> DebugContext<'a>
    {
        DebugContext {
            debug_info_off: off,
            registers_size,
            ins_size,
            insns_size: 10,
            access_flags,
            class_descriptor: "Lfoo/Bar;",
            parameter_types: params,
            source_file_idx: 7,
        }
    }

    /// Empty container with the program appended after the 8-byte magic
    fn dex_with_program(program: &[u8]) -> DexFile
    {
        let mut bytes = b"dex\n035\0".to_vec();
        bytes.extend_from_slice(program);
        DexFile::from_bytes(&bytes).unwrap()
    }

    /// Program stored as a method's debug info in a container whose string
    /// pool starts `x`, `I`, `TT;` and whose type 0 is `I`
    fn dex_with_names(ops: &[u8]) -> (DexFile, u32)
    {
        let mut b = DexBuilder::new();
        b.string("x");
        b.type_id("I");
        b.string("TT;");
        let t = b.type_id("La/B;");
        let m = b.method("La/B;", "m", "V", &[]);
        let mut c = bare_class(t);
        c.direct_methods.push(MethodSpec {
            method_idx: m,
            access: ACC_STATIC,
            code: Some(CodeSpec { registers: 4, insns: vec![0; 10], debug: Some(debug_program(1, &[], ops)), ..CodeSpec::default() }),
        });
        b.class(c);
        let built = b.build();
        let code = CodeItem::read(&built.bytes, built.code_offsets[&m]).unwrap();
        (DexFile::from_vec(built.bytes).unwrap(), code.debug_info_off)
    }

    #[test]
    fn extended_local_carries_signature()
    {
        // v1 = x:I with signature TT;, ended at 3
        let (dex, off) = dex_with_names(&[0x04, 0x01, 0x01, 0x01, 0x03, 0x01, 0x03, 0x05, 0x01, 0x00]);
        let out = interpret(&dex, &ctx(off, 4, 0, ACC_STATIC, &[]));
        assert!(out.completed);
        assert_eq!(out.locals, vec![LocalRange {
            register: 1,
            name: Some("x".to_string()),
            descriptor: Some("I".to_string()),
            signature: Some("TT;".to_string()),
            start: 0,
            end: 3,
        }]);
    }

    #[test]
    fn start_local_on_live_register_closes_previous()
    {
        // v2 = x:I at 0, advance 4, v2 = x with no type
        let (dex, off) = dex_with_names(&[0x03, 0x02, 0x01, 0x01, 0x01, 0x04, 0x03, 0x02, 0x01, 0x00, 0x00]);
        let out = interpret(&dex, &ctx(off, 4, 0, ACC_STATIC, &[]));
        assert!(out.completed);
        assert_eq!(out.locals, vec![
            LocalRange {
                register: 2,
                name: Some("x".to_string()),
                descriptor: Some("I".to_string()),
                signature: None,
                start: 0,
                end: 4,
            },
            LocalRange { register: 2, name: Some("x".to_string()), descriptor: None, signature: None, start: 4, end: 10 },
        ]);
    }

    #[test]
    fn huge_register_count_only_tracks_touched_registers()
    {
        // start local in v65534, the last valid register
        let dex = dex_with_program(&[0x01, 0x00, 0x03, 0xfe, 0xff, 0x03, 0x00, 0x00, 0x00]);
        for _ in 0..10_000 {
            let out = interpret(&dex, &ctx(8, 0xffff, 0, ACC_STATIC, &[]));
            assert!(out.completed);
            assert_eq!(out.locals.len(), 1);
            assert_eq!((out.locals[0].register, out.locals[0].start, out.locals[0].end), (0xfffe, 0, 10));
        }

        // `this` lands in the last register
        let dex = dex_with_program(&[0x01, 0x00, 0x00]);
        let out = interpret(&dex, &ctx(8, 0xffff, 1, 0, &[]));
        assert_eq!(out.locals.len(), 1);
        assert_eq!(out.locals[0].register, 0xfffe);

        // v65535 is out of range
        let dex = dex_with_program(&[0x01, 0x00, 0x03, 0xff, 0xff, 0x03, 0x00, 0x00, 0x00]);
        let out = interpret(&dex, &ctx(8, 0xffff, 0, ACC_STATIC, &[]));
        assert!(!out.completed);
        assert!(out.locals.is_empty());
    }

    #[test]
    fn special_opcode_zero_moves_line_down()
    {
        let dex = dex_with_program(&[0x01, 0x00, 0x0a, 0x00]);
        let out = interpret(&dex, &ctx(8, 0, 0, ACC_STATIC, &[]));
        assert!(out.completed);
        assert_eq!(out.positions, vec![PositionRecord { source_file_idx: 7, address: 0, line: -3 }]);
        assert!(out.locals.is_empty());
    }

    #[test]
    fn advance_and_special_opcodes()
    {
        // line 10; advance pc 3; advance line -2; special 0x0a + 2*15 + 5
        let dex = dex_with_program(&[0x0a, 0x00, 0x01, 0x03, 0x02, 0x7e, 0x2d, 0x09, 0x00, 0x0a, 0x00]);
        let out = interpret(&dex, &ctx(8, 1, 0, ACC_STATIC, &[]));
        assert_eq!(out.positions, vec![
            PositionRecord { source_file_idx: 7, address: 5, line: 9 },
            PositionRecord { source_file_idx: NO_INDEX, address: 5, line: 5 },
        ]);
    }

    #[test]
    fn this_is_seeded_and_closed_at_end()
    {
        // 2 registers, 1 in: v1 is `this`
        let dex = dex_with_program(&[0x01, 0x00, 0x00]);
        let out = interpret(&dex, &ctx(8, 2, 1, 0, &[]));
        assert!(out.completed);
        assert_eq!(out.locals, vec![LocalRange {
            register: 1,
            name: Some("this".to_string()),
            descriptor: Some("Lfoo/Bar;".to_string()),
            signature: None,
            start: 0,
            end: 10,
        }]);
    }

    #[test]
    fn end_and_restart_local()
    {
        // this in v0; end v0 at 2, restart at 4
        let dex = dex_with_program(&[0x01, 0x00, 0x01, 0x02, 0x05, 0x00, 0x01, 0x02, 0x06, 0x00, 0x00]);
        let out = interpret(&dex, &ctx(8, 1, 1, 0, &[]));
        let spans: Vec<(u32, u32)> = out.locals.iter().map(|l| (l.start, l.end)).collect();
        assert_eq!(spans, vec![(0, 2), (4, 10)]);
        assert_eq!(out.locals[1].name.as_deref(), Some("this"));
    }

    #[test]
    fn bad_register_soft_fails()
    {
        // start local in v5 with only 2 registers, after one position
        let dex = dex_with_program(&[0x01, 0x00, 0x0e, 0x03, 0x05, 0x00, 0x00, 0x0e, 0x00]);
        let out = interpret(&dex, &ctx(8, 2, 0, ACC_STATIC, &[]));
        assert!(!out.completed);
        assert_eq!(out.positions.len(), 1);
    }

    #[test]
    fn truncated_program_keeps_records()
    {
        let dex = dex_with_program(&[0x01, 0x00, 0x0e, 0x0e]);
        let out = interpret(&dex, &ctx(8, 1, 0, ACC_STATIC, &[]));
        assert!(!out.completed);
        assert_eq!(out.positions.len(), 2);
    }

    #[test]
    fn wide_parameters_take_two_registers()
    {
        // static (J, I) in v0..v2, names absent
        let dex = dex_with_program(&[0x01, 0x02, 0x00, 0x00, 0x03, 0x02, 0x00, 0x00, 0x00]);
        let out = interpret(&dex, &ctx(8, 3, 3, ACC_STATIC, &["J", "I"]));
        assert!(out.completed);
        // v2 is the int parameter; start local there closes nothing since it was unnamed
        assert_eq!(out.locals.len(), 1);
        assert_eq!(out.locals[0].register, 2);
        assert_eq!(out.locals[0].name, None);
    }

    #[test]
    fn ins_larger_than_registers()
    {
        let dex = dex_with_program(&[0x01, 0x00, 0x0e, 0x00]);
        let out = interpret(&dex, &ctx(8, 1, 2, ACC_STATIC, &[]));
        assert!(!out.completed);
        assert!(out.positions.is_empty());
    }

    #[test]
    fn unreadable_offset()
    {
        let dex = dex_with_program(&[]);
        assert_eq!(interpret(&dex, &ctx(u32::MAX, 1, 0, 0, &[])), DebugOutput::default());
    }
}
