pub mod client;
pub mod types;

pub use client::TelegramTransport;
pub use types::TelegramConfig;
