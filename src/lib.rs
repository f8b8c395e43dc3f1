//! # Jarify
//!
//! Translates Dalvik register bytecode into JVM class files.
//!
//! A [`dex::DexFile`] holds the reference pools and classes of one dex
//! container, with method bodies already decoded and annotated with the
//! type hints from verification. [`jvm::ClassWriter`] turns a single class
//! into class file bytes and [`processor::Processor`] does the same for
//! every class of a set of dex files on a pool of worker threads.
//!
//! ```no_run
//!  use jarify::dex::DexFile;
//!  use jarify::processor::{LogCallback, Processor, ProcessorConfig};
//!
//!  let mut dex = DexFile::new();
//!  dex.link_hints().unwrap();
//!  let result = Processor::new(ProcessorConfig::default()).process(&[dex], &LogCallback).unwrap();
//!  println!("{} classes translated.", result.classes.len());
//! ```

#[macro_use]
mod error;

pub mod dex;
pub mod jvm;
pub mod processor;
pub mod treelist;
pub mod typeinference;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{ErrorKind, TranslateError};
