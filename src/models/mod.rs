pub mod conversion;
pub mod job;
pub mod task;
