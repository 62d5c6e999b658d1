//! Core types and traits for the Chalpu menu-extraction API.
//!
//! Field names follow the backend's camelCase JSON.

mod dto;
mod traits;

pub use dto::*;
pub use traits::*;
