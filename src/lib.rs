//! # Dexload
//!
//! A defensive decoder for Android DEX containers: header and index pools,
//! class data, code items, exception tables and debug-info programs, turned
//! into class, symbol, import, string and source-line records.
//!
//! Every offset and count comes from untrusted input and is checked against
//! the buffer before use. Only a bad magic fails a load; anything else damaged
//! yields a partial result.
//!
//! # Examples
//!
//! ```no_run
//!  use dexload::{DexBin, LoadOptions};
//!
//!  let bytes = std::fs::read("classes.dex").unwrap();
//!  let bin = DexBin::load(&bytes, LoadOptions::default()).unwrap();
//!  for class in bin.classes() {
//!      println!("{} ({} methods)", class.name, class.methods.len());
//!  }
//!  println!("entry points: {:x?}", bin.entries());
//! ```

pub mod dex;
pub mod loader;
pub mod sink;
#[cfg(test)]
mod tests;
pub mod types;

pub use crate::dex::error::{DexError, ErrorKind};
pub use crate::loader::{decode_into, DexBin, LoadOptions};
pub use crate::sink::{Collected, ResultSink};
