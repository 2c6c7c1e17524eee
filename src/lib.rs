pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod order;
pub mod order_log;
pub mod server;
pub mod stripe;
pub mod sync_images;
pub mod webhook;
