pub mod gateway;
pub mod handler;
