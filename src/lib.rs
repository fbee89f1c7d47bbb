pub mod api;
pub mod client_ip;
pub mod config;
pub mod counter;
pub mod cursor;
pub mod identity;
pub mod models;
pub mod storage;
