pub mod broadcaster;
pub mod config;
pub mod db;
pub mod feed_client;
pub mod marketplace;
pub mod monitor;
pub mod notifications;
pub mod provider;
pub mod store;
pub mod version;
pub mod web;
