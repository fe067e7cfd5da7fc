//! Data Transfer Objects for REST request/response serialization.

pub mod arena_dto;
pub mod system_dto;

pub use arena_dto::*;
pub use system_dto::*;
