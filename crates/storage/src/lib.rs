pub mod backend;
pub mod error;
mod path;
pub mod shard;
mod staged;

pub use crate::backend::StorageBackend;
pub use crate::path::{validate as validate_path, validate_file_name};
pub use crate::staged::{Reservation, Source, StagedFile};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
