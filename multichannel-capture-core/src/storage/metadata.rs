use std::fs;
use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::recording_result::CaptureReport;

/// Write a capture report as pretty-printed JSON.
pub fn write_report(report: &CaptureReport, path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize report: {}", e)))?;
    fs::write(path, json).map_err(|e| CaptureError::StorageError(format!("failed to write report: {}", e)))?;
    Ok(())
}

/// Read a capture report back from its sidecar file.
pub fn read_report(path: &Path) -> Result<CaptureReport, CaptureError> {
    let json = fs::read_to_string(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read report: {}", e)))?;
    let report: CaptureReport = serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse report: {}", e)))?;
    Ok(report)
}
