pub mod config;
pub mod eta;
pub mod feed;
pub mod fetch;
pub mod geo;
pub mod geometry;
pub mod gtfs;
pub mod hub;
pub mod parser;
pub mod query;
pub mod server;
pub mod simulator;
pub mod sms;
pub mod telemetry;
pub mod tracker;
pub mod vehicles;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
