pub mod destination;
pub mod event;
