pub mod conversion;
pub mod executor;
pub mod orchestrator;
pub mod packager;
pub mod queue;
pub mod storage;
pub mod toolchain;
