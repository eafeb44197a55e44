pub mod assembly;
pub mod range;
pub mod status;
pub mod upload;
