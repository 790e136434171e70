pub mod models;
pub mod mutation;
pub mod rotation;
