pub mod id;
pub mod scope;
pub mod types;
