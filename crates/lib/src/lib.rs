//! Gatekeep core library: feed connection, message registry and review session,
//! shared by the CLI and desktop applications.

pub mod config;
pub mod error;
pub mod feed;
pub mod init;
pub mod review;
