pub mod artifact;
pub mod upload;
