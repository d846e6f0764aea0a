pub mod channel;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod decision;
pub mod error;
pub mod event;
pub mod hook;
pub mod ipc;
pub mod mirror;
pub mod process;
pub mod recovery;
pub mod render;
pub mod request;
pub mod session;
pub mod storage;
pub mod terminal;
