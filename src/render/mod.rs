pub mod compositor;
pub mod context;
pub mod effects;
pub mod filters;
pub mod programs;
pub mod surface;
