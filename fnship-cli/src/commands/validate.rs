// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! `fnship validate` command - Validate project configuration.

use super::{open_project, ProjectArgs};

pub async fn execute(args: &ProjectArgs, names: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(path = %args.path.display(), "Validating configuration");

    let result = match open_project(args) {
        Ok(mut project) => project.load_functions(names).await.map(|_| project),
        Err(e) => Err(e),
    };

    match result {
        Ok(project) => {
            let config = project.config();
            println!("✓ Configuration is valid");
            println!();
            println!("Project Settings:");
            println!("  Name:          {}", config.name);
            println!("  Name Template: {}", config.name_template.as_str());
            println!("  Concurrency:   {}", project.concurrency());
            println!(
                "  Environment:   {}",
                project.environment().unwrap_or("-")
            );
            println!();
            println!("Functions ({}):", project.functions().len());
            for function in project.functions() {
                let c = function.config();
                println!(
                    "  - {} (runtime: {}, handler: {}, alias: {}, retained: {})",
                    function.name(),
                    c.runtime,
                    c.handler,
                    c.alias,
                    c.retained_versions
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
