pub mod api;
pub mod config;
pub mod dates;
pub mod detail;
pub mod error;
pub mod normalize;
pub mod poller;
pub mod snapshot;
pub mod types;
pub mod upstream;
