//! Data Transfer Objects for REST response serialization.

pub mod stats_dto;

pub use stats_dto::*;
