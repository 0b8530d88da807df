//! DOM domain types.
//!
//! Only the file-input upload path is modeled.

use serde::Serialize;

/// Parameters for DOM.setFileInputFiles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFileInputFilesParams {
    /// Absolute paths of the files to select.
    pub files: Vec<String>,
    /// Remote object ID of the `<input type="file">` element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}
