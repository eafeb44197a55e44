pub mod form;
pub mod model;
