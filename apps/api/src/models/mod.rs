pub mod document;
pub mod usage;
