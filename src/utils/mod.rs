pub mod command;
pub mod file;
pub mod galaxy;
pub mod library;
pub mod logging;
pub mod manifest;
pub mod registry;
pub mod sambam;
pub mod sample_sheet;
pub mod stats;
pub mod system;
pub mod workflow;
