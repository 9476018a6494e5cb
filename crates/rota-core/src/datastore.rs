use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::editor::Planner;

const PLANNER_FILE: &str = "planner.toml";

/// Snapshot storage for the CLI: one TOML file holding every timetable,
/// class and slot.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub planner_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let planner_path = data_dir.join(PLANNER_FILE);
        if !planner_path.exists() {
            fs::write(&planner_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            planner = %planner_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            planner_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Planner> {
        debug!(file = %self.planner_path.display(), "loading planner");
        let raw = fs::read_to_string(&self.planner_path)
            .with_context(|| format!("failed reading {}", self.planner_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Planner::new());
        }

        let planner: Planner = toml::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.planner_path.display()))?;
        planner
            .validate()
            .with_context(|| format!("invalid record in {}", self.planner_path.display()))?;

        debug!(
            timetables = planner.timetables().len(),
            classes = planner.classes().len(),
            "loaded planner"
        );
        Ok(planner)
    }

    #[tracing::instrument(skip(self, planner))]
    pub fn save(&self, planner: &Planner) -> anyhow::Result<()> {
        let serialized = toml::to_string(planner).context("failed to serialize planner")?;
        save_atomic(&self.planner_path, &serialized)
            .with_context(|| format!("failed to save {}", self.planner_path.display()))
    }
}

#[tracing::instrument(skip(path, contents))]
fn save_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "saving atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
