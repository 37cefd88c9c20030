pub mod bytes;
pub mod file;
pub mod table;
