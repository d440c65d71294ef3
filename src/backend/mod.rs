//! Backend modules and the function tables built from them.

mod module;
pub mod pseudo;
mod table;

pub use module::{DynamicModule, LoadError, StaticModule, SymbolSource};
pub use table::{FunctionTable, is_operation_available};
