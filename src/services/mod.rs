pub mod analysis;
pub mod catalog;
pub mod imaging;
pub mod repository;
pub mod runner;
pub mod storage;
pub mod task_store;
