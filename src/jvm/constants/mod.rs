pub mod calculator;
pub mod lookup;

pub use calculator::{calc, lookup_only, normalize};
