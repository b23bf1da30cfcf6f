pub mod form;
pub mod headers;
pub mod session;
