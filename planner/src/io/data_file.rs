//! Planning data files (`planning_data<timestamp>.data`).

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::core::recorder::PlanningTable;

/// File name for a table written now.
pub fn data_file_name() -> String {
    format!("planning_data{}.data", Utc::now().format("%Y%m%d_%H%M%S%.3f"))
}

/// Write `table` into `dir` under a fresh timestamped name and return the path.
///
/// Never overwrites: a second write within the same millisecond gets a
/// numeric suffix (`..._1.data`).
pub fn write_planning_data(dir: &Path, table: &PlanningTable) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create data folder {}", dir.display()))?;
    let name = data_file_name();
    let stem = name.trim_end_matches(".data");
    let contents = table.render();

    let mut suffix = 0u32;
    loop {
        let path = if suffix == 0 {
            dir.join(&name)
        } else {
            dir.join(format!("{stem}_{suffix}.data"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())
                    .with_context(|| format!("write planning data {}", path.display()))?;
                info!(path = %path.display(), rows = table.len(), "planning data written");
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("create planning data {}", path.display()));
            }
        }
    }
}
