//! Stage snapshots.
//!
//! A [`Stage`] owns the parsed layer of one scene file plus a lazily built
//! composed view of it. The composed view is rebuilt on the next read after
//! a variant selection changes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use crate::compose::ComposedStage;
use crate::usd::{LayerMetadata, UsdLayer};

/// A stage shared between tool calls. Reads take the read lock for the whole
/// operation, variant changes take the write lock.
pub type SharedStage = Arc<RwLock<Stage>>;

/// One opened scene: the authored layer and its composed prim tree.
#[derive(Debug)]
pub struct Stage {
    source_path: PathBuf,
    layer: UsdLayer,
    composed: OnceLock<Arc<ComposedStage>>,
}

impl Stage {
    pub fn new(source_path: impl Into<PathBuf>, layer: UsdLayer) -> Self {
        Self {
            source_path: source_path.into(),
            layer,
            composed: OnceLock::new(),
        }
    }

    /// File this snapshot was read from.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn layer(&self) -> &UsdLayer {
        &self.layer
    }

    pub fn metadata(&self) -> &LayerMetadata {
        &self.layer.metadata
    }

    /// The composed prim tree for the current variant selections.
    pub fn composed(&self) -> Arc<ComposedStage> {
        self.composed
            .get_or_init(|| {
                log::debug!("Composing {}", self.source_path.display());
                Arc::new(ComposedStage::compose(&self.layer))
            })
            .clone()
    }

    /// Wrap this stage for sharing between threads.
    pub fn into_shared(self) -> SharedStage {
        Arc::new(RwLock::new(self))
    }

    pub(crate) fn layer_mut(&mut self) -> &mut UsdLayer {
        &mut self.layer
    }

    /// Drop the composed view; the next read recomposes.
    pub(crate) fn invalidate(&mut self) {
        if self.composed.take().is_some() {
            log::debug!("Invalidated composed view of {}", self.source_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::load_usda_from_string;

    #[test]
    fn test_composed_view_is_cached() {
        let stage = load_usda_from_string("def Xform \"A\" {\n}\n", "a.usda").unwrap();
        let first = stage.composed();
        let second = stage.composed();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_recomposes() {
        let mut stage = load_usda_from_string("def Xform \"A\" {\n}\n", "a.usda").unwrap();
        let before = stage.composed();
        stage.invalidate();
        let after = stage.composed();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 1);
    }
}
