//! Local storage: CSV series tables, cursor derivation and the persister.

pub mod persist;
pub mod reader;
pub mod table;

pub use persist::{persist, PersistError, PersistReport};
pub use reader::{is_up_to_date, read_cursor, CursorStatus};
pub use table::{read_table, render_table, LoadedTable, ReadError, TableFormat, COLUMNS};
