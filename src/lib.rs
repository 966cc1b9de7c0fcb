//! Cache node library: file identity, keystamp auth, usage ledger and HTTP handlers

pub mod file;
pub mod args;
pub mod auth;
pub mod proxy;
pub mod store;
pub mod frontend;
pub mod service;
pub mod server;
pub mod api;
pub mod app_state;
pub mod config;
