pub mod cnc;
pub mod config;
pub mod link;
