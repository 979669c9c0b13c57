//! Project commands

pub mod init;

pub use init::{init_project, InitError};
