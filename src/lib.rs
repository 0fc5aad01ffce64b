// src/lib.rs

pub mod app_state;
pub mod checksum;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metadata;
pub mod optimize;
pub mod paths;
pub mod permissions;
pub mod records;
pub mod session;
pub mod store;
