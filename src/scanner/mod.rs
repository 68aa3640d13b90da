//! Filter-driven stock scanning.

mod engine;
mod fields;
mod filter;
mod universe;

pub use engine::{
    ExcludedSymbol, ScanMatch, ScanRequest, ScanResult, ScannerService, SymbolAnalysis,
};
pub use fields::{Field, SymbolRecord};
pub use filter::{CombineMode, CompareOp, FilterList, FilterRule, FilterValue};
pub use universe::{names as universe_names, resolve as resolve_universe};
