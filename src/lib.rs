//! ts2sh: TypeScript project to self-extracting shell script converter
//!
//! Uploaded projects are compiled with `tsc`, and the emitted JavaScript is
//! packed into a single executable bash script that unpacks itself into a
//! temporary directory and runs the entry point with `node`.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
