pub mod client;
pub mod command;
pub mod common;
pub mod config;
pub mod error;
pub mod instance;
pub mod log;
pub mod protocol;
pub mod recovery;
pub mod server;
pub mod space;
pub mod tuple;
pub mod update;
pub mod varint;

#[cfg(test)]
pub mod test_helpers;
