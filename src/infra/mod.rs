//! Controller-side infrastructure.
pub mod twai;
