//! Application Layer
//!
//! Services orchestrating the domain rules on top of the repositories, plus
//! the request/response DTOs of the HTTP surface.

pub mod dto;
pub mod pagination;
pub mod services;

pub use pagination::{Page, PageRequest, Pagination};
