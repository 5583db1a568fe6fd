//! fnship Core Library
//!
//! Deployment engine for fnship serverless projects. Provides project and
//! function configuration loading, the plugin pipeline, deterministic archive
//! builds, the remote platform interface, and the deploy, alias, rollback and
//! invoke lifecycle.

pub mod archive;
pub mod config;
pub mod diff;
pub mod error;
pub mod function;
pub mod ignore;
pub mod plugin;
pub mod project;
pub mod remote;
pub mod types;

// Re-export commonly used types
pub use archive::ArchiveBuilder;
pub use config::{ConfigLoader, FunctionConfig, ProjectConfig};
pub use error::{RemoteError, RollbackError, ShipError, ShipResult};
pub use function::{DeployAction, Deployment, Function, FunctionSpec, Invocation};
pub use plugin::{Plugin, PluginRegistry};
pub use project::{Project, ProjectOptions};
pub use remote::{DryRun, MemoryRemote, RemoteService};
pub use types::{FunctionName, Hook};
