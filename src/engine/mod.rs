pub mod archive;
pub mod coordinator;
pub mod registry;
