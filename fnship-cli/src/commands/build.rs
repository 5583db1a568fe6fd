// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! `fnship build` command - Write one function's archive.

use std::io::Write;
use std::path::Path;

use fnship_core::archive::content_hash;

use super::{open_project, ProjectArgs};

pub async fn execute(
    args: &ProjectArgs,
    name: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = open_project(args)?;
    let function = project.load_function(name).await?;

    let bytes = function.build().await?;
    tracing::info!(
        function = %function.name(),
        bytes = bytes.len(),
        sha256 = %content_hash(&bytes),
        "Built archive"
    );

    match output {
        Some(path) => {
            tokio::fs::write(path, &bytes).await?;
            tracing::info!(path = %path.display(), "Wrote archive");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
