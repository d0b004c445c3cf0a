pub mod api;
pub mod constants;
pub mod events;
pub mod model;
pub mod reactions;
pub mod validation;

pub use model::RecordError;
