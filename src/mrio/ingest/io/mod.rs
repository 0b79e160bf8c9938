//! Raw readers shared by the adapters: dataset locations, delimited text,
//! workbooks and dense array containers.

pub mod delimited;
pub mod npz;
pub mod repository;
pub mod spreadsheet;

pub use delimited::{LabelledBlock, read_grid};
pub use repository::Repository;
pub use spreadsheet::{Cell, Grid, Workbook};
