pub mod app_state;
pub mod auth;
pub mod bids;
pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod models;
pub mod negotiation;
pub mod project;
pub mod service;
pub mod store;
pub mod ws;
