pub mod runner;
pub mod types;

pub use runner::{render_message, Dispatcher};
pub use types::{Author, DeliveryReport, DispatcherConfig};
