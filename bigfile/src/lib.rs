//! Assembles files uploaded as numbered chunks into verified,
//! content-addressed artifacts and serves them back from any offset.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod utils;
