//! Models module
//!
//! Values shared by the import side and the database layer: the normalizer produces
//! [`Row`]s, the populator hands them to a backend, the backend binds each
//! [`CellValue`] as a statement parameter.

pub mod value;

pub use value::{CellValue, Row};
