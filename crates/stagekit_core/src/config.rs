//! Tool configuration.

use serde::{Deserialize, Serialize};

use crate::export::ExportFormat;

/// Settings for [`SceneTools`](crate::SceneTools), usually read from a JSON file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Re-open a cached stage when its file changed on disk. Reloading drops
    /// variant selections made in the session.
    pub reload_on_change: bool,

    /// Format used when an export request names none
    pub default_export_format: ExportFormat,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            reload_on_change: true,
            default_export_format: ExportFormat::Stl,
        }
    }
}
