//! I/O-backed collaborators and file formats.

pub mod config;
pub mod data_log;
pub mod hud;
pub mod input;
pub mod protocol_file;
pub mod table;
