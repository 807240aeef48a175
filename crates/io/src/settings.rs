use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relay_core::DataSettings;
use tracing::{info, warn};

/// `~/.iremoteengineer/data_settings.json`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".iremoteengineer").join("data_settings.json"))
}

fn read_settings(path: &Path) -> Result<DataSettings> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let settings: DataSettings =
        serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", path.display()))?;
    Ok(settings)
}

/// Never fails: a missing or broken file yields the defaults.
pub fn load_settings(path: &Path) -> DataSettings {
    if !path.exists() {
        info!("No data settings at {}, using defaults", path.display());
        return DataSettings::default();
    }
    match read_settings(path) {
        Ok(s) => s,
        Err(e) => {
            warn!("Error loading data settings: {e:#}");
            DataSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &DataSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, settings)?;
    writeln!(w)?;
    w.flush()?;
    info!("Data settings saved to {}", path.display());
    Ok(())
}
