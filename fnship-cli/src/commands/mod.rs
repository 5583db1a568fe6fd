// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! CLI command modules.

pub mod build;
pub mod clean;
pub mod list;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use fnship_core::{MemoryRemote, PluginRegistry, Project, ProjectOptions, ShipResult};

/// Project selection shared by every command.
pub struct ProjectArgs {
    pub path: PathBuf,
    pub environment: Option<String>,
}

/// Open the project with the built-in plugins.
///
/// Local commands never reach a remote platform, so an empty in-memory one
/// stands in for it.
pub fn open_project(args: &ProjectArgs) -> ShipResult<Project> {
    let options = ProjectOptions {
        environment: args.environment.clone(),
        ..ProjectOptions::new(args.path.clone())
    };
    Project::open(
        options,
        Arc::new(PluginRegistry::with_builtins()),
        Arc::new(MemoryRemote::new()),
    )
}
