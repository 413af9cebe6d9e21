/* First pass: class definitions to class records and symbols */

use log::{debug, warn};

use crate::dex::class_data::{ClassDataReader, ClassMember, CodeItem, EncodedField, EncodedMethod, MemberKind};
use crate::dex::debug_info::{interpret, DebugContext};
use crate::dex::dex_file::{ClassDefItem, DexFile, CLASS_DEF_SIZE, FIELD_ID_SIZE};
use crate::dex::error::DexError;
use crate::dex::flags::{MethodFlags, NO_INDEX};
use crate::dex::signature::{strip_descriptor_end, UNRESOLVED};
use crate::dex::{clamp_count, read_u2, read_u4};
use crate::loader::LoadOptions;
use crate::sink::{DecodedClass, MethodDebug};
use crate::types::{Binding, ClassRecord, DebugRow, SymbolKind, SymbolRecord};

/// State shared by every class of the first pass
pub(crate) struct ClassPass<'a>
{
    dex: &'a DexFile,
    options: &'a LoadOptions,
    /// Method indices defined by some class_data_item
    covered: Vec<bool>,
    next_symbol: u32,
}

impl<'a> ClassPass<'a>
{
    pub fn new(dex: &'a DexFile, options: &'a LoadOptions) -> ClassPass<'a>
    {
        ClassPass { dex, options, covered: vec![false; dex.method_count()], next_symbol: 0 }
    }

    /// Hands over what the import pass needs
    pub fn finish(self) -> (Vec<bool>, u32)
    {
        (self.covered, self.next_symbol)
    }

    fn symbol_ordinal(&mut self) -> u32
    {
        let o = self.next_symbol;
        self.next_symbol += 1;
        o
    }

    /// Decodes one class_def. `None` when the class name does not resolve.
    pub fn decode_class(&mut self, ordinal: u32, def: &ClassDefItem) -> Option<DecodedClass>
    {
        let dex = self.dex;
        let descriptor = match dex.type_descriptor(def.class_idx) {
            Some(d) if !d.is_empty() => d,
            _ => {
                debug!("class_def #{} type {} has no name, skipped", ordinal, def.class_idx);
                return None;
            }
        };
        let name = strip_descriptor_end(descriptor).to_string();

        let superclass = if def.superclass_idx == NO_INDEX { None }
            else { dex.type_descriptor(def.superclass_idx).map(String::from) };

        let mut class = DecodedClass {
            record: ClassRecord {
                name,
                superclass,
                interfaces: self.interfaces(def),
                source_file: dex.get_string(def.source_file_idx).map(String::from),
                access_flags: def.access_flags,
                ordinal,
                address: dex.pools.class_defs.record_offset(ordinal, CLASS_DEF_SIZE).unwrap_or(0),
                fields: vec![],
                methods: vec![],
            },
            method_addresses: vec![],
            debug: vec![],
        };

        if def.class_data_off == 0 {
            return Some(class);
        }
        if (def.class_data_off as u64) < dex.pools.class_defs.end(CLASS_DEF_SIZE)
        {
            warn!("[classdata] {} points back into the class_defs table (0x{:x}), no members", descriptor, def.class_data_off);
            return Some(class);
        }

        let reader = ClassDataReader::new(dex.bytes(), def.class_data_off, self.options.max_methods_per_class);
        for member in reader
        {
            match member
            {
                Ok(ClassMember::Field(f)) => {
                    if let Some(sym) = self.field_symbol(&class.record.name, &f) {
                        class.record.fields.push(sym);
                    }
                }
                Ok(ClassMember::Method(m)) => self.method(descriptor, def, &m, &mut class),
                Err(e) => {
                    let e = DexError::with_context(e, format!("class data of {}", descriptor));
                    warn!("[classdata] {}, keeping {} members", e, class.record.fields.len() + class.record.methods.len());
                    break;
                }
            }
        }
        Some(class)
    }

    /// Interface descriptors, only read from inside the data section
    fn interfaces(&self, def: &ClassDefItem) -> Vec<String>
    {
        let dex = self.dex;
        if def.interfaces_off == 0 || !dex.header.in_data_section(def.interfaces_off) {
            return vec![];
        }
        let bytes = dex.bytes();
        let mut ix = def.interfaces_off as usize;
        let declared = match read_u4(bytes, &mut ix) {
            Ok(n) => n,
            Err(_) => return vec![],
        };
        let size = clamp_count(bytes, ix, declared, 2).min(dex.type_count() as u32);

        let mut interfaces = Vec::with_capacity(size as usize);
        for _ in 0..size
        {
            let Ok(type_idx) = read_u2(bytes, &mut ix) else { break };
            if let Some(d) = dex.type_descriptor(type_idx as u32) {
                interfaces.push(d.to_string());
            }
        }
        interfaces
    }

    fn field_symbol(&mut self, class_name: &str, f: &EncodedField) -> Option<SymbolRecord>
    {
        let dex = self.dex;
        let Some(field) = dex.get_field(f.field_idx) else {
            debug!("{}: field index {} out of range", class_name, f.field_idx);
            return None;
        };
        let ty = dex.type_descriptor(field.type_idx as u32)?;
        let address = dex.pools.fields.record_offset(f.field_idx, FIELD_ID_SIZE)?;
        let field_name = dex.get_string(field.name_idx).unwrap_or(UNRESOLVED);
        let (prefix, kind) = match f.kind {
            MemberKind::StaticField => ("sfield", SymbolKind::Static),
            _ => ("ifield", SymbolKind::Field),
        };

        Some(SymbolRecord {
            name: format!("{}.{}_{}:{}", class_name, prefix, field_name, strip_descriptor_end(ty)),
            address,
            size: 0,
            kind,
            binding: Binding::from_access(f.access_flags),
            flags: MethodFlags::from_access(f.access_flags),
            ordinal: self.symbol_ordinal(),
        })
    }

    fn method(&mut self, descriptor: &str, def: &ClassDefItem, m: &EncodedMethod, class: &mut DecodedClass)
    {
        let dex = self.dex;
        if let Some(c) = self.covered.get_mut(m.method_idx as usize) {
            *c = true;
        }
        let name = dex.qualified_method_name(m.method_idx);
        let binding = Binding::from_access(m.access_flags);
        let flags = MethodFlags::from_access(m.access_flags);

        if m.code_off == 0
        {
            let ordinal = self.symbol_ordinal();
            class.record.methods.push(SymbolRecord {
                name,
                address: m.entry_offset as u64,
                size: 0,
                kind: SymbolKind::Meth,
                binding,
                flags,
                ordinal,
            });
            return;
        }

        let code = match CodeItem::read(dex.bytes(), m.code_off) {
            Ok(code) => code,
            Err(e) => {
                warn!("[codeitem] {} skipped: {}", name, e);
                return;
            }
        };
        let address = code.insns_offset();
        let ordinal = self.symbol_ordinal();
        class.record.methods.push(SymbolRecord {
            name,
            address,
            size: code.insns_byte_len(),
            kind: SymbolKind::Func,
            binding,
            flags,
            ordinal,
        });
        class.method_addresses.push((m.method_idx, address));

        if self.options.debug_info && code.debug_info_off > 0 && dex.header.in_data_section(code.debug_info_off)
        {
            class.debug.push(self.method_debug(descriptor, def, m, &code, address));
        }
    }

    fn method_debug(&self, descriptor: &str, def: &ClassDefItem, m: &EncodedMethod, code: &CodeItem, address: u64) -> MethodDebug
    {
        let dex = self.dex;
        let params = dex.method_parameter_types(m.method_idx).unwrap_or_default();
        let ctx = DebugContext {
            debug_info_off: code.debug_info_off,
            registers_size: code.registers_size,
            ins_size: code.ins_size,
            insns_size: code.insns_size,
            access_flags: m.access_flags,
            class_descriptor: descriptor,
            parameter_types: &params,
            source_file_idx: def.source_file_idx,
        };
        let out = interpret(dex, &ctx);

        let rows = out.positions.iter()
            .filter_map(|p| {
                let file = dex.get_string(p.source_file_idx).filter(|f| !f.is_empty())?;
                Some(DebugRow { address: p.address as u64, line: p.line, file: file.to_string() })
            })
            .collect();

        MethodDebug { address, insns_size: code.insns_size, rows, locals: out.locals }
    }
}
