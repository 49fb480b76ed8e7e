//! Preview dataset builder - shared modules for all binaries.

pub mod catalog;
pub mod config;
pub mod error;
pub mod lastfm;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod safety;
pub mod services;
pub mod spotify;
