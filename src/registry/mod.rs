//! Durable sub-workflow registry.

mod error;
mod schema;
mod store;

pub use error::RegistryError;
pub use store::{rotate_file, RegistryEntry, SubworkflowRegistry, REGISTRY_FILE};
