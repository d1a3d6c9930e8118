//! JSON object files and their companions.
//!
//! `ObjectStore::write_object` is the only code path that produces an object
//! file. Writes are whole-file (temp file + rename) and skipped when the bytes
//! on disk already match, so an unchanged pull touches nothing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use prd_core::{Error, LocalObject, ObjectType, Result};

use crate::companions::{formula_dir, formula_fields, formula_path, hook_source_candidates, hook_source_path};
use crate::layout::Layout;

/// Result of a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

/// Serialize an object the way it is stored on disk.
pub fn render_object(object: &LocalObject, object_type: ObjectType) -> Result<String> {
    let mut object = object.clone();
    object.strip_keys(object_type.ignored_keys());
    let mut text = serde_json::to_string_pretty(&object)?;
    text.push('\n');
    Ok(text)
}

/// Local object store rooted at one organization directory.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    layout: Layout,
}

impl ObjectStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Read a text file, `None` when it does not exist.
    pub async fn read_text(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read an object file.
    pub async fn read_object(&self, path: &Path) -> Result<LocalObject> {
        self.try_read_object(path)
            .await?
            .ok_or_else(|| Error::NotFound(path.display().to_string()))
    }

    /// Read an object file, `None` when it does not exist.
    pub async fn try_read_object(&self, path: &Path) -> Result<Option<LocalObject>> {
        match self.read_text(path).await? {
            Some(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    Error::Serialization(format!("{}: {}", path.display(), e))
                })?;
                Ok(Some(LocalObject::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    /// Write text if it differs from what is on disk.
    pub async fn write_text(&self, path: &Path, text: &str) -> Result<WriteOutcome> {
        if self.read_text(path).await?.as_deref() == Some(text) {
            trace!(path = %self.layout.relative(path).display(), "Unchanged, not writing");
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(path = %parent.display(), error = %e, "create_dir_all failed");
                e
            })?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(text.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %path.display(), error = %e, "rename failed");
            e
        })?;

        debug!(path = %self.layout.relative(path).display(), bytes = text.len(), "Wrote file");
        Ok(WriteOutcome::Written)
    }

    /// Write an object file (ignored keys stripped) together with its companions.
    pub async fn write_object(
        &self,
        path: &Path,
        object: &LocalObject,
        object_type: ObjectType,
    ) -> Result<WriteOutcome> {
        let text = render_object(object, object_type)?;
        let outcome = self.write_text(path, &text).await?;
        let companions = self.attach_companions(path, object, object_type).await?;
        if !companions.is_empty() {
            return Ok(WriteOutcome::Written);
        }
        Ok(outcome)
    }

    /// Write hook source or schema formula sidecars for an object. Returns the
    /// companion paths that were actually written.
    pub async fn attach_companions(
        &self,
        path: &Path,
        object: &LocalObject,
        object_type: ObjectType,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        match object_type {
            ObjectType::Hook => {
                if let Some(code) = object.hook_code() {
                    let source = hook_source_path(path, object.hook_runtime());
                    if self.write_text(&source, code).await?.is_written() {
                        written.push(source);
                    }
                }
            }
            ObjectType::Schema => {
                for (field_id, code) in formula_fields(object) {
                    let file = formula_path(path, &field_id);
                    if self.write_text(&file, &code).await?.is_written() {
                        written.push(file);
                    }
                }
            }
            _ => {}
        }
        Ok(written)
    }

    /// Existing companion files of an object.
    pub async fn companions_of(&self, path: &Path, object_type: ObjectType) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        match object_type {
            ObjectType::Hook => {
                for candidate in hook_source_candidates(path) {
                    if fs::try_exists(&candidate).await? {
                        found.push(candidate);
                    }
                }
            }
            ObjectType::Schema => {
                let dir = formula_dir(path);
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
                    Err(e) => return Err(e.into()),
                };
                while let Some(entry) = entries.next_entry().await? {
                    let file = entry.path();
                    if file.extension().and_then(|e| e.to_str()) == Some("py") {
                        found.push(file);
                    }
                }
                found.sort();
            }
            _ => {}
        }
        Ok(found)
    }

    /// Delete a file if present. Returns whether something was removed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %self.layout.relative(path).display(), "Removed file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an object file and its companions, then prune emptied directories.
    pub async fn remove_object(&self, path: &Path, object_type: ObjectType) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for companion in self.companions_of(path, object_type).await? {
            if self.remove_file(&companion).await? {
                removed.push(companion);
            }
        }
        if self.remove_file(path).await? {
            removed.push(path.to_path_buf());
        }
        if object_type == ObjectType::Schema {
            self.prune_empty_dirs(&formula_dir(path)).await?;
        }
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await?;
        }
        Ok(removed)
    }

    /// Remove `dir` and its ancestors while they are empty, stopping at the
    /// organization directory.
    pub async fn prune_empty_dirs(&self, dir: &Path) -> Result<()> {
        let mut current = dir.to_path_buf();
        while current.starts_with(self.layout.org_dir()) && current != self.layout.org_dir() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => match current.parent() {
                    Some(parent) => {
                        current = parent.to_path_buf();
                        continue;
                    }
                    None => break,
                },
                Err(e) => return Err(e.into()),
            };
            if entries.next_entry().await?.is_some() {
                break;
            }
            fs::remove_dir(&current).await?;
            trace!(path = %self.layout.relative(&current).display(), "Removed empty directory");
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }
}
