pub mod config;
pub mod error;
pub mod persist;
pub mod stats;
pub mod types;

pub use config::EngineConfig;
pub use error::{ErrorKind, HazardError, Result};
pub use types::{IMComponent, IMDataType, IMType, RuptureId, SiteInfo, SourceType, TectonicType, IM};
