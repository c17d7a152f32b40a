#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod collapse;
pub mod comments;
pub mod config;
pub mod data;
pub mod debug;
pub mod detail;
pub mod layout;
pub mod lemmy;
pub mod markdown;
pub mod media;
pub mod player;
pub mod read;
pub mod reply;
pub mod session;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
