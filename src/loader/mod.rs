/* Load driver: container, two decode passes, host queries */

mod class;
pub mod entries;
mod imports;

use log::info;
use std::path::Path;

use crate::dex::dex_file::{DexFile, TYPE_ID_SIZE};
use crate::dex::error::DexError;
use crate::dex::header::HEADER_SIZE;
use crate::loader::class::ClassPass;
use crate::loader::entries::select_entry_points;
use crate::loader::imports::synthesize_imports;
use crate::sink::{Collected, LineTable, ResultSink};
use crate::types::{ClassRecord, DebugRow, DexInfo, ImportRecord, ItemKind, Section, SourceLine, StringRecord, SymbolRecord};

const WEAR_MARKER: &[u8] = b"Landroid/support/wearable/view";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions
{
    /// Run the debug-info programs of methods with code
    pub debug_info: bool,
    /// Extra ceiling on methods read per category of a class, on top of the
    /// remaining-buffer clamp
    pub max_methods_per_class: Option<u32>,
}

impl Default for LoadOptions
{
    fn default() -> Self
    {
        LoadOptions { debug_info: true, max_methods_per_class: None }
    }
}

/// Runs both passes over `dex` and publishes into `sink`: strings, then every
/// class in class_def order, then the imports.
pub fn decode_into<S: ResultSink>(dex: &DexFile, options: &LoadOptions, sink: &mut S)
{
    sink.publish_strings(dex.string_records());

    let mut pass = ClassPass::new(dex, options);
    for (ordinal, def) in dex.class_defs().iter().enumerate()
    {
        if let Some(class) = pass.decode_class(ordinal as u32, def) {
            sink.publish_class(class);
        }
    }

    let (covered, next_symbol) = pass.finish();
    synthesize_imports(dex, &covered, next_symbol, sink);
}

/// A fully decoded DEX container
#[derive(Debug)]
pub struct DexBin
{
    dex: DexFile,
    options: LoadOptions,
    out: Collected,
    entries: Vec<u64>,
}

impl DexBin
{
    /// Fails only when the buffer is not a DEX container at all
    pub fn load(bytes: &[u8], options: LoadOptions) -> Result<DexBin, DexError>
    {
        DexBin::from_dex(DexFile::from_bytes(bytes)?, options)
    }

    pub fn from_file(path: &Path, options: LoadOptions) -> Result<DexBin, DexError>
    {
        DexBin::from_dex(DexFile::from_file(path)?, options)
    }

    fn from_dex(dex: DexFile, options: LoadOptions) -> Result<DexBin, DexError>
    {
        let mut out = Collected::default();
        decode_into(&dex, &options, &mut out);
        let entries = select_entry_points(&out.symbols, out.code_from);
        info!(
            "loaded {} classes, {} symbols, {} imports, {} strings",
            out.classes.len(), out.symbols.len(), out.imports.len(), out.strings.len()
        );
        Ok(DexBin { dex, options, out, entries })
    }

    pub fn dex(&self) -> &DexFile { &self.dex }
    pub fn options(&self) -> &LoadOptions { &self.options }
    pub fn classes(&self) -> &[ClassRecord] { &self.out.classes }
    pub fn symbols(&self) -> &[SymbolRecord] { &self.out.symbols }
    pub fn imports(&self) -> &[ImportRecord] { &self.out.imports }
    pub fn strings(&self) -> &[StringRecord] { &self.out.strings }
    pub fn debug_rows(&self) -> &[DebugRow] { &self.out.debug_rows }
    pub fn lines(&self) -> &LineTable { &self.out.lines }
    pub fn entries(&self) -> &[u64] { &self.entries }
    pub fn code_from(&self) -> Option<u64> { self.out.code_from }
    pub fn code_to(&self) -> Option<u64> { self.out.code_to }

    pub fn collected(&self) -> &Collected
    {
        &self.out
    }

    /// Code address of a defined method, or the method_id address of an import
    pub fn method_address(&self, method_idx: u32) -> Option<u64>
    {
        self.out.method_addresses.get(&method_idx).copied()
    }

    pub fn line_at(&self, address: u64) -> Option<&SourceLine>
    {
        self.out.lines.line_at(address)
    }

    pub fn info(&self) -> DexInfo
    {
        let wear = self.dex.bytes().windows(WEAR_MARKER.len()).any(|w| w == WEAR_MARKER);
        DexInfo {
            version: self.dex.header.version(),
            subsystem: if wear { "android-wear" } else { "android" },
            arch: "dalvik",
            machine: "Dalvik VM",
            bits: 32,
        }
    }

    /// End of the data section as declared by the header
    pub fn size(&self) -> u64
    {
        self.dex.header.data_off as u64 + self.dex.header.data_size as u64
    }

    /// header, constpool, code and data. Empty when no method has code.
    pub fn sections(&self) -> Vec<Section>
    {
        let (Some(from), Some(to)) = (self.out.code_from, self.out.code_to) else {
            return vec![];
        };
        let len = self.dex.len() as u64;
        let header = HEADER_SIZE as u64;

        // data follows the furthest method that fits in the buffer
        let extent = self.out.symbols.iter()
            .filter(|s| s.is_function())
            .map(|s| s.address + s.size)
            .filter(|end| *end <= len)
            .max()
            .unwrap_or(to);
        let data_start = extent.max(to).min(len);

        vec![
            Section { name: "header", address: 0, size: header, executable: false },
            Section { name: "constpool", address: header, size: from.saturating_sub(header), executable: false },
            Section { name: "code", address: from, size: to - from, executable: true },
            Section { name: "data", address: data_start, size: len - data_start, executable: false },
        ]
    }

    pub fn name_of(&self, kind: ItemKind, idx: u32) -> Option<String>
    {
        match kind
        {
            ItemKind::Method => self.dex.get_method(idx).map(|_| self.dex.qualified_method_name(idx)),
            ItemKind::Class => self.dex.type_descriptor(idx).map(String::from),
            ItemKind::Field => self.dex.field_name(idx),
            ItemKind::Proto => self.dex.prototype(idx),
            ItemKind::String => self.dex.get_string(idx).map(String::from),
            ItemKind::Type => self.dex.type_descriptor(idx).map(String::from),
        }
    }

    pub fn offset_of(&self, kind: ItemKind, idx: u32) -> Option<u64>
    {
        match kind
        {
            ItemKind::Method => self.method_address(idx),
            ItemKind::String => self.dex.get_string_offset(idx).map(u64::from),
            ItemKind::Type | ItemKind::Class => self.dex.pools.types.record_offset(idx, TYPE_ID_SIZE),
            ItemKind::Field | ItemKind::Proto => None,
        }
    }
}
