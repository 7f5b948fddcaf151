pub mod connection;
pub mod crc;
pub mod frame;
pub mod receiver;
