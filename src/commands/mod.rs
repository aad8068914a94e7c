// Manifest commands
pub mod run;

// Settings
pub mod config;
