//! # Trellis
//!
//! Command-line front end for `trellis-core`: a redb record database, a
//! small demonstration schema and JSON rendering of loaded object graphs.

pub mod cli;
pub mod config;
pub mod demo;
pub mod render;
