//! Durable medium for workflows.
//!
//! The engine talks to storage only through [`WorkflowStore`]; it buffers its
//! own writes and relies on nothing more than atomic replace of single
//! objects. [`DirectoryStore`] lays a workflow out as a directory tree:
//!
//! ```text
//! <workflow>/metadata.json
//! <workflow>/parameter_data/<handle>/group.json
//! <workflow>/parameter_data/<handle>/arrays/<id>.json
//! <workflow>/events/<index>.json
//! ```

use crate::core::workflow::encoding::{EncodedValue, NumericBlock};
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::event_log::Event;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PARAMETER_DIR: &str = "parameter_data";
const EVENTS_DIR: &str = "events";
const GROUP_FILE: &str = "group.json";
const ARRAYS_DIR: &str = "arrays";

/// One persisted parameter group: the inline encoding plus its flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredGroup {
    #[serde(flatten)]
    pub value: EncodedValue,
    pub is_set: bool,
    #[serde(default)]
    pub is_pending_add: bool,
}

pub trait WorkflowStore: Send {
    /// Location used in messages and for `WorkflowNotFound`/`WorkflowExists`.
    fn location(&self) -> &Path;

    fn exists(&self) -> bool;

    /// Create an empty container. Fails with `WorkflowExists` unless `overwrite`.
    fn initialise(&self, overwrite: bool) -> Result<(), WorkflowError>;

    fn read_metadata(&self) -> Result<Vec<u8>, WorkflowError>;

    /// Replace the root metadata object in one step.
    fn write_metadata(&self, bytes: &[u8]) -> Result<(), WorkflowError>;

    /// Handles of every stored parameter group, ascending.
    fn parameter_handles(&self) -> Result<Vec<usize>, WorkflowError>;

    fn write_parameter_group(
        &self,
        handle: usize,
        group: &StoredGroup,
        children: &[(String, NumericBlock)],
    ) -> Result<(), WorkflowError>;

    fn read_parameter_group(&self, handle: usize) -> Result<Option<StoredGroup>, WorkflowError>;

    fn has_parameter_group(&self, handle: usize) -> Result<bool, WorkflowError> {
        Ok(self.read_parameter_group(handle)?.is_some())
    }

    fn read_parameter_child(&self, handle: usize, child: &str)
        -> Result<NumericBlock, WorkflowError>;

    /// Rewrite the group record only (flags); extracted children are untouched.
    fn update_parameter_group(&self, handle: usize, group: &StoredGroup)
        -> Result<(), WorkflowError>;

    fn remove_parameter_group(&self, handle: usize) -> Result<(), WorkflowError>;

    fn read_events(&self) -> Result<Vec<Event>, WorkflowError>;

    /// Write each event under its own index. Rewriting an index replaces it.
    fn append_events(&self, events: &[Event]) -> Result<(), WorkflowError>;

    /// Drop every stored event with index `from` or above.
    fn remove_events(&self, from: usize) -> Result<(), WorkflowError>;

    /// Remove the whole container.
    fn destroy(&self) -> Result<(), WorkflowError>;
}

/// Filesystem-backed store rooted at one workflow directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    metadata_file: String,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, metadata_file: impl Into<String>) -> Self {
        DirectoryStore {
            root: root.into(),
            metadata_file: metadata_file.into(),
        }
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(&self.metadata_file)
    }

    fn group_dir(&self, handle: usize) -> PathBuf {
        self.root.join(PARAMETER_DIR).join(handle.to_string())
    }

    fn events_dir(&self) -> PathBuf {
        self.root.join(EVENTS_DIR)
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            WorkflowError::storage(
                format!("failed to create directory {}", parent.display()),
                err,
            )
        })?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data).map_err(|err| {
        WorkflowError::storage(format!("failed to write {}", tmp_path.display()), err)
    })?;
    fs::rename(&tmp_path, path).map_err(|err| {
        WorkflowError::storage(
            format!(
                "failed to rename {} -> {}",
                tmp_path.display(),
                path.display()
            ),
            err,
        )
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, WorkflowError> {
    let bytes = fs::read(path)
        .map_err(|err| WorkflowError::storage(format!("failed to read {}", path.display()), err))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Numeric entries of a directory, ascending. A missing directory is empty.
fn numeric_entries(dir: &Path) -> Result<Vec<usize>, WorkflowError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(WorkflowError::storage(
                format!("failed to list {}", dir.display()),
                err,
            ))
        }
    };
    let mut indices = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| WorkflowError::storage(format!("failed to list {}", dir.display()), err))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stem = name.strip_suffix(".json").unwrap_or(&name);
        if let Ok(index) = stem.parse::<usize>() {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

impl WorkflowStore for DirectoryStore {
    fn location(&self) -> &Path {
        &self.root
    }

    fn exists(&self) -> bool {
        self.metadata_path().is_file()
    }

    fn initialise(&self, overwrite: bool) -> Result<(), WorkflowError> {
        if self.root.exists() {
            if !overwrite {
                return Err(WorkflowError::WorkflowExists(self.root.clone()));
            }
            self.destroy()?;
        }
        fs::create_dir_all(self.root.join(PARAMETER_DIR)).map_err(|err| {
            WorkflowError::storage(format!("failed to create {}", self.root.display()), err)
        })?;
        fs::create_dir_all(self.events_dir()).map_err(|err| {
            WorkflowError::storage(format!("failed to create {}", self.root.display()), err)
        })
    }

    fn read_metadata(&self) -> Result<Vec<u8>, WorkflowError> {
        let path = self.metadata_path();
        fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => WorkflowError::WorkflowNotFound(self.root.clone()),
            _ => WorkflowError::storage(format!("failed to read {}", path.display()), err),
        })
    }

    fn write_metadata(&self, bytes: &[u8]) -> Result<(), WorkflowError> {
        atomic_write(&self.metadata_path(), bytes)
    }

    fn parameter_handles(&self) -> Result<Vec<usize>, WorkflowError> {
        numeric_entries(&self.root.join(PARAMETER_DIR))
    }

    fn write_parameter_group(
        &self,
        handle: usize,
        group: &StoredGroup,
        children: &[(String, NumericBlock)],
    ) -> Result<(), WorkflowError> {
        let dir = self.group_dir(handle);
        for (id, block) in children {
            let path = dir.join(ARRAYS_DIR).join(format!("{}.json", id));
            atomic_write(&path, &serde_json::to_vec(block)?)?;
        }
        atomic_write(&dir.join(GROUP_FILE), &serde_json::to_vec(group)?)
    }

    fn read_parameter_group(&self, handle: usize) -> Result<Option<StoredGroup>, WorkflowError> {
        let path = self.group_dir(handle).join(GROUP_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn has_parameter_group(&self, handle: usize) -> Result<bool, WorkflowError> {
        Ok(self.group_dir(handle).join(GROUP_FILE).is_file())
    }

    fn read_parameter_child(
        &self,
        handle: usize,
        child: &str,
    ) -> Result<NumericBlock, WorkflowError> {
        read_json(
            &self
                .group_dir(handle)
                .join(ARRAYS_DIR)
                .join(format!("{}.json", child)),
        )
    }

    fn update_parameter_group(
        &self,
        handle: usize,
        group: &StoredGroup,
    ) -> Result<(), WorkflowError> {
        atomic_write(
            &self.group_dir(handle).join(GROUP_FILE),
            &serde_json::to_vec(group)?,
        )
    }

    fn remove_parameter_group(&self, handle: usize) -> Result<(), WorkflowError> {
        let dir = self.group_dir(handle);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WorkflowError::storage(
                format!("failed to remove {}", dir.display()),
                err,
            )),
        }
    }

    fn read_events(&self) -> Result<Vec<Event>, WorkflowError> {
        let dir = self.events_dir();
        numeric_entries(&dir)?
            .into_iter()
            .map(|index| read_json(&dir.join(format!("{}.json", index))))
            .collect()
    }

    fn append_events(&self, events: &[Event]) -> Result<(), WorkflowError> {
        let dir = self.events_dir();
        for event in events {
            atomic_write(
                &dir.join(format!("{}.json", event.index)),
                &serde_json::to_vec_pretty(event)?,
            )?;
        }
        Ok(())
    }

    fn remove_events(&self, from: usize) -> Result<(), WorkflowError> {
        let dir = self.events_dir();
        for index in numeric_entries(&dir)?.into_iter().filter(|index| *index >= from) {
            let path = dir.join(format!("{}.json", index));
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(WorkflowError::storage(
                        format!("failed to remove {}", path.display()),
                        err,
                    ))
                }
            }
        }
        Ok(())
    }

    fn destroy(&self) -> Result<(), WorkflowError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WorkflowError::storage(
                format!("failed to delete {}", self.root.display()),
                err,
            )),
        }
    }
}
