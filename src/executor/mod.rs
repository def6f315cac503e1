pub mod create_table;
pub mod delete;
pub mod insert;
pub mod scan;
pub mod update;
