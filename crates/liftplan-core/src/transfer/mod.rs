//! Plan import/export formats

pub mod csv;

pub use self::csv::{export, import, CsvError, ImportReport, UnresolvedRow};
