//! Core domain types and logic.

pub mod error;
pub mod index;
pub mod upload_text;
pub mod settings;
pub mod reconcile;
pub mod constituents;
pub mod overlap;
pub mod alerts;
pub mod catalog;
