//! Actions handed back to the operator to run locally

use serde::{Deserialize, Serialize};

/// A script the caller may run on the operator's machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAction {
    pub script: String,
    pub script_description: String,
    /// Whether the caller should run the script without asking
    pub auto_run: bool,
}

impl RemoteAction {
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}
