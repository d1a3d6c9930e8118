//! Reading and writing `mapping.yaml`.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use prd_core::{Error, Result};

use crate::model::Mapping;

/// Load a mapping file. A missing file is `None`; an empty one is an empty mapping.
pub async fn load(path: &Path) -> Result<Option<Mapping>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No previous mapping");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(Some(Mapping::default()));
    }
    serde_yaml::from_str(&text)
        .map(Some)
        .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))
}

/// Write a mapping file through a temporary file and rename.
pub async fn save(path: &Path, mapping: &Mapping) -> Result<()> {
    let text = serde_yaml::to_string(mapping)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("yaml.tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(text.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    info!(path = %path.display(), entries = mapping.entries().len(), "Saved mapping");
    Ok(())
}
