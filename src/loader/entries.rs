use std::collections::HashSet;

use crate::types::{Binding, SymbolRecord};

pub const ON_CREATE_SUFFIX: &str = ".onCreate(Landroid/os/Bundle;)V";
pub const MAIN_SUFFIX: &str = ".main([Ljava/lang/String;)V";

fn matching(symbols: &[SymbolRecord], suffix: &str) -> Vec<u64>
{
    let mut found: Vec<u64> = vec![];
    let mut seen: HashSet<u64> = HashSet::new();
    for s in symbols
    {
        let defined = s.is_function() && s.binding != Binding::None;
        if defined && s.name.len() > suffix.len() && s.name.ends_with(suffix) && seen.insert(s.address) {
            found.push(s.address);
        }
    }
    found
}

/// Entry points by priority: every `onCreate(Bundle)`, else every
/// `main(String[])`, else the lowest code address. Imports never qualify.
pub fn select_entry_points(symbols: &[SymbolRecord], code_from: Option<u64>) -> Vec<u64>
{
    let on_create = matching(symbols, ON_CREATE_SUFFIX);
    if !on_create.is_empty() {
        return on_create;
    }
    let main = matching(symbols, MAIN_SUFFIX);
    if !main.is_empty() {
        return main;
    }
    code_from.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::flags::MethodFlags;
    use crate::types::SymbolKind;

    fn sym(name: &str, address: u64, kind: SymbolKind, binding: Binding) -> SymbolRecord
    {
        SymbolRecord { name: name.to_string(), address, size: 0, kind, binding, flags: MethodFlags::empty(), ordinal: 0 }
    }

    #[test]
    fn on_create_wins_over_main()
    {
        let symbols = vec![
            sym("LMain.main([Ljava/lang/String;)V", 0x10, SymbolKind::Func, Binding::Global),
            sym("Lapp/Act.onCreate(Landroid/os/Bundle;)V", 0x20, SymbolKind::Func, Binding::Local),
            sym("Lapp/Other.onCreate(Landroid/os/Bundle;)V", 0x20, SymbolKind::Func, Binding::Global),
        ];
        assert_eq!(select_entry_points(&symbols, Some(0x10)), vec![0x20]);
    }

    #[test]
    fn main_then_code_start()
    {
        let symbols = vec![
            sym("LMain.main([Ljava/lang/String;)V", 0x30, SymbolKind::Meth, Binding::Local),
            sym("imp.Lx.onCreate(Landroid/os/Bundle;)V", 0x40, SymbolKind::Func, Binding::None),
        ];
        assert_eq!(select_entry_points(&symbols, Some(0x10)), vec![0x30]);
        assert_eq!(select_entry_points(&symbols[1..], Some(0x10)), vec![0x10]);
        assert!(select_entry_points(&symbols[1..], None).is_empty());
    }

    #[test]
    fn repeated_addresses_keep_first_seen_order()
    {
        let mut symbols: Vec<SymbolRecord> = (0..100_000u64)
            .map(|i| sym("La/B.onCreate(Landroid/os/Bundle;)V", 0x100 + (i % 3) * 8, SymbolKind::Meth, Binding::Local))
            .collect();
        symbols.push(sym("La/C.onCreate(Landroid/os/Bundle;)V", 0x10, SymbolKind::Func, Binding::Global));
        assert_eq!(select_entry_points(&symbols, Some(0x10)), vec![0x100, 0x108, 0x110, 0x10]);
    }

    #[test]
    fn bare_suffix_and_fields_do_not_match()
    {
        let symbols = vec![
            sym(MAIN_SUFFIX, 0x30, SymbolKind::Func, Binding::Global),
            sym("LA.sfield_x:LA.main([Ljava/lang/String;)V", 0x50, SymbolKind::Static, Binding::Global),
        ];
        assert!(select_entry_points(&symbols, None).is_empty());
    }
}
