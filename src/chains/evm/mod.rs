pub mod checker;
pub mod client;
pub mod context;
pub mod crawler;
pub mod import_log;
