pub mod hygiene;
pub mod persist;
pub mod render;
pub mod search;
pub mod sparse;
pub mod types;
