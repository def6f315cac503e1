pub mod config;
pub mod executor;
pub mod relation;
pub mod storage;
pub mod types;
pub mod utils;
