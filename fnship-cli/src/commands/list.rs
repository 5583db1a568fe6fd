// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! `fnship list` command - List functions in the project.

use super::{open_project, ProjectArgs};

pub async fn execute(args: &ProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut project = open_project(args)?;
    project.load_functions::<&str>(&[]).await?;

    println!();
    println!("  {}", project.config().name);
    if !project.config().description.is_empty() {
        println!("  {}", project.config().description);
    }
    println!();

    println!(
        "  {:<20} {:<28} {:<12} {:<8} {:<8}",
        "FUNCTION", "REMOTE NAME", "RUNTIME", "MEMORY", "TIMEOUT"
    );
    for function in project.functions() {
        let config = function.config();
        println!(
            "  {:<20} {:<28} {:<12} {:<8} {:<8}",
            function.name(),
            function.remote_name(),
            config.runtime,
            format!("{}MB", config.memory),
            format!("{}s", config.timeout),
        );
    }

    println!();
    println!("Total: {} function(s)", project.functions().len());
    Ok(())
}
