pub mod adapters;
pub mod config;
pub mod error;
pub mod panel;
pub mod web;
