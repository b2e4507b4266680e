pub mod state;
pub mod stats;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Which path a load took. Loads never fail; they fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    Corrupt(String),
}

impl LoadOutcome {
    pub fn was_defaulted(&self) -> bool {
        !matches!(self, LoadOutcome::Loaded)
    }
}

pub(crate) fn load_json<T: DeserializeOwned + Default>(path: &Path) -> (T, LoadOutcome) {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (T::default(), LoadOutcome::Missing);
        }
        Err(e) => return (T::default(), LoadOutcome::Corrupt(e.to_string())),
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(value) => (value, LoadOutcome::Loaded),
        Err(e) => (T::default(), LoadOutcome::Corrupt(e.to_string())),
    }
}

/// Write to a sibling temp file, then rename over the target.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let encoded = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, encoded).with_context(|| format!("writing {}", Path::new(&tmp).display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
