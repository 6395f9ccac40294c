mod repository;
mod schema;

pub use repository::{CleanupReport, Repository};
