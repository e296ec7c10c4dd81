pub mod dedup;
pub mod destinations;
pub mod snapshot;

pub use dedup::DedupStore;
pub use destinations::DestinationStore;
