//! CSV driver: command input and report output.

pub mod command_reader;
pub mod report_writer;
