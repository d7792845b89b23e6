pub mod cache;
pub mod crawler;
pub mod error;
pub mod sink;
pub mod source;
pub mod state;
pub mod storage;
pub mod synchronizer;
pub mod table;
pub mod types;
