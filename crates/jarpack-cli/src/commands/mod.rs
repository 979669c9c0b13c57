pub mod bundle;
pub mod init;
pub mod inspect;
