mod table;

pub use table::{CountryBaseline, KEY_COLUMN};
