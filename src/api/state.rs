use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::export::OutputLayout;

#[derive(Clone)]
pub struct AppState {
    pub output_root: Arc<PathBuf>,
    pub layout: Arc<OutputLayout>,
}

impl AppState {
    pub fn new(output_root: PathBuf, layout: OutputLayout) -> Self {
        Self {
            output_root: Arc::new(output_root),
            layout: Arc::new(layout),
        }
    }

    /// Absolute path of a published artifact.
    pub fn artifact(&self, relative: &Path) -> PathBuf {
        self.output_root.join(relative)
    }
}
