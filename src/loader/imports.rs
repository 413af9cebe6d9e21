/* Second pass: methods referenced but never defined become imports */

use log::debug;
use std::collections::BTreeSet;

use crate::dex::dex_file::{DexFile, METHOD_ID_SIZE};
use crate::dex::flags::MethodFlags;
use crate::sink::{DecodedImport, ResultSink};
use crate::types::{Binding, ImportRecord, SymbolKind, SymbolRecord};

/// Publishes one import per method id that no class_data_item defined and
/// whose class has no class_def. Symbol ordinals continue after `next_symbol`.
pub(crate) fn synthesize_imports<S: ResultSink>(dex: &DexFile, covered: &[bool], mut next_symbol: u32, sink: &mut S)
{
    let defined: BTreeSet<u32> = dex.class_defs().iter().map(|c| c.class_idx).collect();
    let mut next_import = 0u32;

    for (i, method) in dex.methods().iter().enumerate()
    {
        let idx = i as u32;
        if covered.get(i).copied().unwrap_or(false) || defined.contains(&(method.class_idx as u32)) {
            continue;
        }
        let class_ok = dex.type_descriptor(method.class_idx as u32).is_some_and(|c| !c.is_empty());
        let name_ok = dex.method_name(idx).is_some_and(|n| !n.is_empty());
        if !class_ok || !name_ok {
            debug!("method id #{} has no usable class or name, not imported", i);
            continue;
        }
        let Some(address) = dex.pools.methods.record_offset(idx, METHOD_ID_SIZE) else { continue };

        let name = dex.qualified_method_name(idx);
        let record = ImportRecord {
            name: name.clone(),
            kind: SymbolKind::Func,
            binding: Binding::None,
            ordinal: next_import,
        };
        let symbol = SymbolRecord {
            name: format!("imp.{}", name),
            address,
            size: 0,
            kind: SymbolKind::Func,
            binding: Binding::None,
            flags: MethodFlags::empty(),
            ordinal: next_symbol,
        };
        next_import += 1;
        next_symbol += 1;
        sink.publish_import(DecodedImport { record, symbol, method_idx: idx });
    }
}
