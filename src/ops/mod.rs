pub mod crop;
pub mod filters;
pub mod transform;
