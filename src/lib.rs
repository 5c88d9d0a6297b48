//! Field Dispatch — chat-driven task dispatch for field crews.

pub mod bot;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod phone;
pub mod status;
pub mod store;
pub mod tasks;

pub use error::{Error, Result};
