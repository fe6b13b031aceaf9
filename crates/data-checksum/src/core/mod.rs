//! Core value and column model shared by every layer.

pub mod chunk;
pub mod column;
pub mod identifier;
pub mod table;
pub mod value;

pub use chunk::{CheckLevel, ChunkRange, TimeWindow};
pub use column::{Column, ColumnList, ColumnType};
pub use identifier::{qualify_mysql, quote_all, quote_mysql, validate_identifier};
pub use table::{TablePair, TableRef};
pub use value::{ColumnValues, SqlValue, DATETIME_FORMAT};
