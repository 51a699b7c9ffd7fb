//! CLI subcommand implementations for the prospector binary.

pub mod convert_cmd;
pub mod doctor;
pub mod init_cmd;
pub mod output;
pub mod run_cmd;
