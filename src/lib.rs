pub mod actions;
pub mod config_dir;
pub mod gestures;
pub mod grabber;
pub mod handlers;
pub mod locking;
pub mod logging;
pub mod service;
pub mod session;
pub mod settings;
pub mod trace;
