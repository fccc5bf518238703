pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod format;
pub mod normalize;
pub mod proxy;
pub mod render;
pub mod summary;
pub mod types;
pub mod view;
