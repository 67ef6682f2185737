pub mod analyze;
pub mod model;

// Re-export commonly used types/functions for consumers
pub use analyze::{analyze_entries, Analysis, Block, EdgeOut, FunctionOut};
pub use model::{load_raw_bin, Coverage, Image, LabelKV, Labels, Segment};
