pub mod color;
pub mod frame;
pub mod geometry;
pub mod mirror;
pub mod overlay;
