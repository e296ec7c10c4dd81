pub mod app;
pub mod bus;
pub mod commands;
pub mod config;
pub mod errors;
pub mod feed;
pub mod models;
pub mod observability;
pub mod store;
pub mod tasks;
pub mod telegram;
#[cfg(test)]
mod test_helpers;
pub mod transport;

pub use app::App;
pub use config::{load_config, AppConfig};
