pub mod error;
pub mod service_handler;
