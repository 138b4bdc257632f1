pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod runtime;
pub mod seed;
