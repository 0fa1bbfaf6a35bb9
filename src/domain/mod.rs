//! Pure domain types with minimal dependencies
//!
//! Types here have no platform dependencies so the geometry and state logic
//! can be exercised without any rendering or capture surface.

pub mod artifact;
pub mod geometry;
pub mod selection;

pub use artifact::*;
pub use geometry::*;
pub use selection::*;
