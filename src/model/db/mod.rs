pub mod nomination;
pub mod position;
