/* Where decoded classes, imports, strings and debug rows end up */

use rangemap::RangeInclusiveMap;
use std::collections::HashMap;

use crate::dex::debug_info::LocalRange;
use crate::types::{ClassRecord, DebugRow, ImportRecord, SourceLine, StringRecord, SymbolKind, SymbolRecord};

/// Debug output of one method with code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDebug
{
    /// Symbol address the row addresses are relative to
    pub address: u64,
    pub insns_size: u32,
    pub rows: Vec<DebugRow>,
    pub locals: Vec<LocalRange>,
}

/// Everything decoded for one class, published in a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClass
{
    pub record: ClassRecord,
    /// (method index, code address) of every method with code
    pub method_addresses: Vec<(u32, u64)>,
    pub debug: Vec<MethodDebug>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImport
{
    pub record: ImportRecord,
    pub symbol: SymbolRecord,
    pub method_idx: u32,
}

/// Receives the results of a decode. Each call carries a finished unit of
/// work; nothing is published for a class until all of its members and
/// debug programs have been decoded.
pub trait ResultSink
{
    fn publish_strings(&mut self, strings: Vec<StringRecord>);
    fn publish_class(&mut self, class: DecodedClass);
    fn publish_import(&mut self, import: DecodedImport);
}

/// Address to source line lookup, and back
#[derive(Debug, Default, Clone)]
pub struct LineTable
{
    by_address: RangeInclusiveMap<u64, SourceLine>,
    by_line: HashMap<SourceLine, u64>,
}

impl LineTable
{
    /// Each row covers the addresses up to the next row of the same method,
    /// the last one up to the end of the method.
    pub fn add_method(&mut self, debug: &MethodDebug)
    {
        let method_end = debug.address + debug.insns_size as u64;
        for (i, row) in debug.rows.iter().enumerate()
        {
            let start = debug.address + row.address;
            let next = debug.rows.get(i + 1).map(|r| debug.address + r.address).unwrap_or(method_end);
            let last = if next > start { next - 1 } else { start };
            let line = SourceLine { file: row.file.clone(), line: row.line };
            self.by_address.insert(start..=last, line.clone());
            self.by_line.insert(line, start);
        }
    }

    pub fn line_at(&self, address: u64) -> Option<&SourceLine>
    {
        self.by_address.get(&address)
    }

    pub fn address_of(&self, file: &str, line: i64) -> Option<u64>
    {
        self.by_line.get(&SourceLine { file: file.to_string(), line }).copied()
    }

    pub fn is_empty(&self) -> bool
    {
        self.by_line.is_empty()
    }
}

/// Default in-memory sink
#[derive(Debug, Default, Clone)]
pub struct Collected
{
    pub classes: Vec<ClassRecord>,
    pub symbols: Vec<SymbolRecord>,
    pub imports: Vec<ImportRecord>,
    pub strings: Vec<StringRecord>,
    pub debug_rows: Vec<DebugRow>,
    /// Local variable ranges keyed by method address
    pub locals: Vec<(u64, Vec<LocalRange>)>,
    pub lines: LineTable,
    pub method_addresses: HashMap<u32, u64>,
    pub code_from: Option<u64>,
    pub code_to: Option<u64>,
}

impl ResultSink for Collected
{
    fn publish_strings(&mut self, strings: Vec<StringRecord>)
    {
        self.strings.extend(strings);
    }

    fn publish_class(&mut self, class: DecodedClass)
    {
        let DecodedClass { record, method_addresses, debug } = class;

        self.symbols.extend(record.fields.iter().cloned());
        self.symbols.extend(record.methods.iter().cloned());
        for sym in record.methods.iter().filter(|s| s.kind == SymbolKind::Func)
        {
            self.code_from = Some(self.code_from.map_or(sym.address, |c| c.min(sym.address)));
            self.code_to = Some(self.code_to.map_or(sym.address, |c| c.max(sym.address)));
        }
        self.method_addresses.extend(method_addresses);

        for d in debug
        {
            self.lines.add_method(&d);
            self.debug_rows.extend(d.rows);
            if !d.locals.is_empty() {
                self.locals.push((d.address, d.locals));
            }
        }
        self.classes.push(record);
    }

    fn publish_import(&mut self, import: DecodedImport)
    {
        self.method_addresses.insert(import.method_idx, import.symbol.address);
        self.symbols.push(import.symbol);
        self.imports.push(import.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(address: u64, line: i64) -> DebugRow
    {
        DebugRow { address, line, file: "A.java".to_string() }
    }

    #[test]
    fn rows_cover_until_next_row()
    {
        let mut t = LineTable::default();
        t.add_method(&MethodDebug { address: 0x100, insns_size: 8, rows: vec![row(0, 3), row(4, 5)], locals: vec![] });
        assert_eq!(t.line_at(0x100).map(|l| l.line), Some(3));
        assert_eq!(t.line_at(0x103).map(|l| l.line), Some(3));
        assert_eq!(t.line_at(0x104).map(|l| l.line), Some(5));
        assert_eq!(t.line_at(0x107).map(|l| l.line), Some(5));
        assert_eq!(t.line_at(0x108), None);
        assert_eq!(t.address_of("A.java", 5), Some(0x104));
        assert_eq!(t.address_of("B.java", 5), None);
    }

    #[test]
    fn repeated_addresses_do_not_panic()
    {
        let mut t = LineTable::default();
        t.add_method(&MethodDebug { address: 0, insns_size: 0, rows: vec![row(2, 1), row(2, 2), row(0, 3)], locals: vec![] });
        assert_eq!(t.line_at(2).map(|l| l.line), Some(2));
        assert_eq!(t.line_at(0).map(|l| l.line), Some(3));
    }
}
