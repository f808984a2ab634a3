//! File input and output: delimited tables in, JSON model artifacts out.
pub mod model_store;
pub mod table_reader;
