// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! `fnship clean` command - Remove local build byproducts.

use super::{open_project, ProjectArgs};

pub async fn execute(args: &ProjectArgs, names: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut project = open_project(args)?;
    project.load_functions(names).await?;
    project.clean().await?;

    println!("✓ Cleaned {} function(s)", project.functions().len());
    Ok(())
}
