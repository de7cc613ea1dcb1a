// amtd-auth - Library root

pub mod auth;
pub mod config;
pub mod error;
