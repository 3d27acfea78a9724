pub mod category;
pub mod chat;
pub mod config;
pub mod finalize;
pub mod init;
pub mod pool;
pub mod say;
pub mod status;
