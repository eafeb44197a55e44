pub mod cli;
pub mod digest;
pub mod keyed_lock;
pub mod state;
pub mod validation;
