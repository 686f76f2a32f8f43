pub mod app;
pub mod cache;
pub mod call;
pub mod download;
pub mod get;
pub mod print;
