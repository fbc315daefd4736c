pub mod client;
pub mod command;
pub mod data_channel;
pub mod error;
pub mod listing;
pub mod messages;
pub mod server;
pub mod transfer;
