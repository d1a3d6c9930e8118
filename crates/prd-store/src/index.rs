//! Pure index of the local tree: which object lives where.
//!
//! The index is built once per run by walking the organization directory.
//! Decision logic (routing, stale removal, push) consumes it instead of
//! walking the tree itself.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{trace, warn};

use prd_core::{LocalObject, ObjectKey, ObjectType, Result, Subdirectory};

use crate::layout::{classify, Layout};
use crate::store::ObjectStore;

/// One pulled object found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedObject {
    pub key: ObjectKey,
    pub name: String,
    pub path: PathBuf,
    /// `None` for the organization file.
    pub subdir: Option<String>,
    pub modified_at: Option<String>,
}

/// `{type: {id: path}}` and `{type: {id: name}}` over one organization directory.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    objects: Vec<IndexedObject>,
    by_key: BTreeMap<ObjectKey, usize>,
    foreign: Vec<PathBuf>,
}

impl TreeIndex {
    /// Walk the organization directory and index every object file.
    pub async fn scan(store: &ObjectStore) -> Result<Self> {
        let layout = store.layout();
        let mut index = TreeIndex::default();
        for path in json_files(layout.org_dir()).await? {
            let Some(object_type) = classify(&path) else {
                continue;
            };
            let object = match store.read_object(&path).await {
                Ok(object) => object,
                Err(e) => {
                    warn!(path = %layout.relative(&path).display(), error = %e, "Unreadable object file, treating as foreign");
                    index.foreign.push(path);
                    continue;
                }
            };
            index.add(layout, object_type, &object, path);
        }
        Ok(index)
    }

    fn add(&mut self, layout: &Layout, object_type: ObjectType, object: &LocalObject, path: PathBuf) {
        if object.is_foreign() {
            trace!(path = %layout.relative(&path).display(), "Foreign file");
            self.foreign.push(path);
            return;
        }
        let Some(id) = object.id else {
            return;
        };
        let key = ObjectKey::new(object_type, id);
        trace!(object_type = %object_type, object_id = id, path = %layout.relative(&path).display(), "Indexed");
        let entry = IndexedObject {
            key,
            name: object.display_name().to_string(),
            subdir: layout.subdir_of(&path),
            modified_at: object.modified_at.clone(),
            path,
        };
        self.by_key.entry(key).or_insert(self.objects.len());
        self.objects.push(entry);
    }

    /// Index entries built from in-memory objects.
    pub fn from_entries(entries: impl IntoIterator<Item = IndexedObject>) -> Self {
        let mut index = TreeIndex::default();
        for entry in entries {
            index.by_key.entry(entry.key).or_insert(index.objects.len());
            index.objects.push(entry);
        }
        index
    }

    /// Every indexed object, duplicates included, in path order.
    pub fn objects(&self) -> &[IndexedObject] {
        &self.objects
    }

    /// Files without id or url. Never deleted or overwritten automatically.
    pub fn foreign(&self) -> &[PathBuf] {
        &self.foreign
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&IndexedObject> {
        self.by_key.get(key).map(|&i| &self.objects[i])
    }

    pub fn path_of(&self, key: &ObjectKey) -> Option<&Path> {
        self.get(key).map(|o| o.path.as_path())
    }

    pub fn name_of(&self, key: &ObjectKey) -> Option<&str> {
        self.get(key).map(|o| o.name.as_str())
    }

    /// Object recorded at a path.
    pub fn at_path(&self, path: &Path) -> Option<&IndexedObject> {
        self.objects.iter().find(|o| o.path == path)
    }

    /// `{id: path}` for one type.
    pub fn paths_by_id(&self, object_type: ObjectType) -> BTreeMap<i64, PathBuf> {
        self.objects
            .iter()
            .filter(|o| o.key.object_type == object_type)
            .map(|o| (o.key.id, o.path.clone()))
            .collect()
    }

    /// `{id: name}` for one type.
    pub fn names_by_id(&self, object_type: ObjectType) -> BTreeMap<i64, String> {
        self.objects
            .iter()
            .filter(|o| o.key.object_type == object_type)
            .map(|o| (o.key.id, o.name.clone()))
            .collect()
    }

    /// Keys found inside one subdirectory.
    pub fn keys_in(&self, subdir: &str) -> BTreeSet<ObjectKey> {
        self.objects
            .iter()
            .filter(|o| o.subdir.as_deref() == Some(subdir))
            .map(|o| o.key)
            .collect()
    }

    /// Rebuild every subdirectory's `object_ids` from the files on disk.
    pub fn seed_subdirectories(&self, subdirs: &mut [Subdirectory]) {
        for subdir in subdirs.iter_mut() {
            subdir.object_ids = self.keys_in(&subdir.name);
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// All `.json` files under `root`, sorted, skipping hidden directories.
pub async fn json_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.file_type().await?.is_dir() {
                if !hidden {
                    pending.push(path);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
