//! pawlog: pet-care logs with remote-preferred, local-fallback storage.
//! Shared library for the MCP server and the CLI.

pub mod album;
pub mod app;
pub mod assistant;
pub mod config;
pub mod error;
pub mod guard;
pub mod intent;
pub mod llm;
pub mod local;
pub mod ordering;
pub mod record;
pub mod remote;
pub mod repository;
pub mod server;
pub mod social;
pub mod stats;

pub use app::{Collection, PetCare};
pub use config::Config;
pub use error::{StoreError, SubmitError, ValidationError};
pub use repository::{Location, Repository};
