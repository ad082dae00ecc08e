pub mod config;
pub mod db;
pub mod fetcher;
pub mod forwarder;
pub mod handlers;
pub mod job;
pub mod model;
pub mod normalize;
pub mod store;
pub mod telegram;
pub mod twitter;
