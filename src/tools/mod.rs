pub mod ai_format;
pub mod compare;
pub mod load_data;
pub mod response_types;
pub mod simulate;
pub mod strategies;
pub mod surface;
