/* Records handed to the host: classes, symbols, imports, strings, lines */

use serde::Serialize;
use std::fmt;

use crate::dex::flags::MethodFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymbolKind
{
    /// Method with a code body
    Func,
    /// Method without code, addressed at its encoded_method entry
    Meth,
    /// Instance field
    Field,
    /// Static field
    Static,
}

impl SymbolKind
{
    pub fn as_str(&self) -> &'static str
    {
        match self
        {
            SymbolKind::Func => "FUNC",
            SymbolKind::Meth => "METH",
            SymbolKind::Field => "FIELD",
            SymbolKind::Static => "STATIC",
        }
    }
}

impl fmt::Display for SymbolKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Binding
{
    Global,
    Local,
    /// Imports
    None,
}

impl Binding
{
    pub fn from_access(access_flags: u32) -> Binding
    {
        if access_flags & crate::dex::flags::ACC_PUBLIC != 0 { Binding::Global } else { Binding::Local }
    }

    pub fn as_str(&self) -> &'static str
    {
        match self
        {
            Binding::Global => "GLOBAL",
            Binding::Local => "LOCAL",
            Binding::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRecord
{
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub binding: Binding,
    pub flags: MethodFlags,
    pub ordinal: u32,
}

impl SymbolRecord
{
    pub fn is_function(&self) -> bool
    {
        matches!(self.kind, SymbolKind::Func | SymbolKind::Meth)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRecord
{
    /// Descriptor without the trailing `;`
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
    pub access_flags: u32,
    pub ordinal: u32,
    /// Offset of the class_def_item
    pub address: u64,
    pub fields: Vec<SymbolRecord>,
    pub methods: Vec<SymbolRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRecord
{
    pub name: String,
    pub kind: SymbolKind,
    pub binding: Binding,
    pub ordinal: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringRecord
{
    pub value: String,
    pub address: u64,
    pub ordinal: u32,
    /// UTF-16 units
    pub length: u32,
    /// MUTF-8 bytes
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugRow
{
    /// Method-relative, in code units
    pub address: u64,
    pub line: i64,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLine
{
    pub file: String,
    pub line: i64,
}

impl fmt::Display for SourceLine
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}|{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section
{
    pub name: &'static str,
    pub address: u64,
    pub size: u64,
    pub executable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DexInfo
{
    pub version: Option<u32>,
    pub subsystem: &'static str,
    pub arch: &'static str,
    pub machine: &'static str,
    pub bits: u8,
}

/// Index spaces that names and offsets can be looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemKind
{
    Method,
    String,
    Type,
    Class,
    Field,
    Proto,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render_like_host_tags()
    {
        assert_eq!(SymbolKind::Func.to_string(), "FUNC");
        assert_eq!(SymbolKind::Static.as_str(), "STATIC");
        assert_eq!(Binding::None.as_str(), "NONE");
        assert_eq!(Binding::from_access(0x9), Binding::Global);
        assert_eq!(Binding::from_access(0x8), Binding::Local);
    }

    #[test]
    fn source_line_key()
    {
        let l = SourceLine { file: "Foo.java".to_string(), line: -3 };
        assert_eq!(l.to_string(), "Foo.java|-3");
    }
}
