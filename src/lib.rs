pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod forwarder;
pub mod occupancy;
pub mod osc;
pub mod sensor;
pub mod server;
pub mod state;
