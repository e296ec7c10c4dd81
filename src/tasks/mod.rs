pub mod dispatcher;
pub mod feed_poller;
pub mod supervisor;
