// src/spensiones/mod.rs
pub mod client;
pub mod models;
