pub mod bytes;
pub mod mock;
