//! Core module - configuration and events

pub mod config;
pub mod events;
