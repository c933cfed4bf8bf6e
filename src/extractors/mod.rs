// src/extractors/mod.rs
pub mod convert;
pub mod html;
