pub mod api;
pub mod lifecycle;
pub mod orchestrator;
pub mod role;
pub mod worker;
