//! Canonical labelled-matrix model shared by every adapter.

pub mod index;
pub mod matrix;
pub mod system;
pub mod table;

pub use index::{IndexLevel, Key, MultiIndex, schema};
pub use matrix::{Matrix, div0};
pub use system::{CanonicalSystem, Extension};
pub use table::{Axis, DroppedSlice, Table, UnitTable};
