pub mod runner;
pub mod state;

pub use runner::ConnectionSupervisor;
pub use state::ConnectionState;
