//! Dialog registry
//!
//! A `DialogSet` resolves dialog ids to units. It is built at startup and then
//! shared read-only (behind `Arc`) by every conversation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::dialogs::Dialog;
use crate::error::{DialogError, Result};

/// Named collection of dialogs
#[derive(Clone, Default)]
pub struct DialogSet {
    dialogs: HashMap<String, Arc<dyn Dialog>>,
    version: OnceLock<String>,
}

impl DialogSet {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog and its dependencies, returning the id it ended up with
    ///
    /// A different dialog already holding the same id forces a numeric suffix
    /// onto the newcomer (`name2`, `name3`, ...). Adding the same instance
    /// again changes nothing.
    pub fn add(&mut self, dialog: Arc<dyn Dialog>) -> Result<String> {
        let id = dialog.id();
        if id.trim().is_empty() {
            return Err(DialogError::InvalidArgument(
                "dialog id must not be blank".to_string(),
            ));
        }

        if let Some(existing) = self.dialogs.get(&id) {
            if same_instance(existing, &dialog) {
                return Ok(id);
            }

            let mut suffix = 2;
            let renamed = loop {
                let candidate = format!("{id}{suffix}");
                if !self.dialogs.contains_key(&candidate) {
                    break candidate;
                }
                suffix += 1;
            };
            debug!(original = %id, renamed = %renamed, "Dialog id collision resolved");
            dialog.identity().set(renamed);
        }

        let id = dialog.id();
        self.dialogs.insert(id.clone(), dialog.clone());
        self.version.take();

        for dependency in dialog.dependencies() {
            self.add(dependency)?;
        }

        Ok(id)
    }

    /// Look up a dialog by id
    pub fn find(&self, id: &str) -> Result<Option<Arc<dyn Dialog>>> {
        if id.trim().is_empty() {
            return Err(DialogError::InvalidArgument(
                "dialog id must not be blank".to_string(),
            ));
        }
        Ok(self.dialogs.get(id).cloned())
    }

    /// Whether a dialog is registered under `id`
    pub fn contains(&self, id: &str) -> bool {
        self.dialogs.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.dialogs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// Fingerprint of every member's version
    ///
    /// Computed on first read after a change and cached until the next `add`.
    pub fn version(&self) -> &str {
        self.version.get_or_init(|| {
            let mut ids: Vec<&String> = self.dialogs.keys().collect();
            ids.sort();

            let mut versions = String::new();
            for id in ids {
                let version = self.dialogs[id].version();
                if !version.is_empty() {
                    versions.push_str(&version);
                }
            }

            hex::encode(Sha256::digest(versions.as_bytes()))
        })
    }
}

impl std::fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSet")
            .field("dialogs", &self.ids())
            .finish()
    }
}

fn same_instance(a: &Arc<dyn Dialog>, b: &Arc<dyn Dialog>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
