use dexload::types::SymbolKind;
use dexload::{DexBin, LoadOptions};
use std::env;
use std::error::Error;
use std::path::Path;

// Prints a summary of a DEX file: counts, sections, entry points and imports.
//Usage: dexinfo <classes.dex>
fn main()
{
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("usage: dexinfo <classes.dex>");
        return;
    }

    // Do everything else with the error trap
    match process_dex(&args[1]) {
        Ok(_) => {}
        Err(e) => { println!("Aborted due to error: {}", e); }
    }
}

fn process_dex(dex_file: &str) -> Result<(), Box<dyn Error>>
{
    let bin = DexBin::from_file(Path::new(dex_file), LoadOptions::default())?;

    let info = bin.info();
    match info.version {
        Some(v) => println!("{} {} (dex {:03})", info.machine, info.subsystem, v),
        None => println!("{} {} (unknown version)", info.machine, info.subsystem),
    }

    let functions = bin.symbols().iter().filter(|s| s.kind == SymbolKind::Func).count();
    println!("classes:  {}", bin.classes().len());
    println!("symbols:  {} ({} with code)", bin.symbols().len(), functions);
    println!("imports:  {}", bin.imports().len());
    println!("strings:  {}", bin.strings().len());
    println!("lines:    {}", bin.debug_rows().len());

    for s in bin.sections() {
        println!("section {:<9} 0x{:08x} +0x{:x}{}", s.name, s.address, s.size, if s.executable { " x" } else { "" });
    }

    for entry in bin.entries()
    {
        let name = bin.symbols().iter().find(|s| s.address == *entry && s.is_function()).map(|s| s.name.as_str());
        println!("entry 0x{:08x} {}", entry, name.unwrap_or(""));
        if let Some(line) = bin.line_at(*entry) {
            println!("      at {}", line);
        }
    }

    for import in bin.imports().iter().take(20) {
        println!("import {}", import.name);
    }
    Ok(())
}
