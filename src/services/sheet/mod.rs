pub mod aggregator;
pub mod classifier;
pub mod parser;
pub mod utils;

pub use aggregator::{build_charts, charts_for_table};
pub use classifier::classify_columns;
pub use parser::{FileKind, TableParser};
