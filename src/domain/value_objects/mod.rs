//! Value Objects
//!
//! Immutable value types shared by several entities.

mod pair;

pub use pair::CanonicalPair;
