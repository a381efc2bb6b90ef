pub mod client;
pub mod config;
pub mod desk;
pub mod errors;
pub mod ui;
