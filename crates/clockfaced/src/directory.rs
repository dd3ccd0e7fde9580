//! JSON-file employee directory.
//!
//! The kiosk consumes a periodic export from the HR system: a JSON array of
//! employees with paths to their reference photos, resolved relative to the
//! export file. The directory service owns the data; this adapter only
//! reads it.

use crate::registration::{DirectoryError, EmployeeDirectory};
use clockface_core::Employee;
use image::GrayImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct DirectoryEntry {
    id: String,
    display_name: String,
    reference_image: Option<String>,
}

pub struct JsonDirectory {
    root: PathBuf,
    employees: Vec<Employee>,
}

impl JsonDirectory {
    /// Load the directory export. Image paths are resolved against the
    /// export file's parent directory.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::Backend(format!("{}: {e}", path.display())))?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&raw)
            .map_err(|e| DirectoryError::Backend(format!("{}: {e}", path.display())))?;

        let employees = entries
            .into_iter()
            .map(|e| Employee {
                id: e.id,
                display_name: e.display_name,
                reference_image: e.reference_image,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            path = %path.display(),
            employees = employees.len(),
            "loaded employee directory"
        );

        Ok(Self {
            root: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            employees,
        })
    }
}

impl EmployeeDirectory for JsonDirectory {
    fn list(&self) -> Result<Vec<Employee>, DirectoryError> {
        Ok(self.employees.clone())
    }

    fn get(&self, employee_id: &str) -> Result<Option<Employee>, DirectoryError> {
        Ok(self.employees.iter().find(|e| e.id == employee_id).cloned())
    }

    fn load_reference_image(
        &self,
        employee: &Employee,
    ) -> Result<Option<GrayImage>, DirectoryError> {
        let Some(relative) = &employee.reference_image else {
            return Ok(None);
        };
        let path = self.root.join(relative);
        match image::open(&path) {
            Ok(img) => Ok(Some(img.to_luma8())),
            Err(err) => {
                // A broken or missing photo counts as unregistered, not as
                // an aborted run.
                tracing::warn!(
                    employee_id = %employee.id,
                    path = %path.display(),
                    error = %err,
                    "reference image unreadable"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_directory(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("employees.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_load_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_directory(
            tmp.path(),
            r#"[
                {"id": "e1", "display_name": "Ada Lovelace", "reference_image": "ada.png"},
                {"id": "e2", "display_name": "Mary Shelley", "reference_image": null}
            ]"#,
        );

        let dir = JsonDirectory::load(&path).unwrap();
        let employees = dir.list().unwrap();
        assert_eq!(employees.len(), 2);
        assert_eq!(employees[0].display_name, "Ada Lovelace");
        assert_eq!(dir.get("e2").unwrap().unwrap().display_name, "Mary Shelley");
        assert!(dir.get("nobody").unwrap().is_none());
    }

    #[test]
    fn test_reference_image_loads_grayscale() {
        let tmp = tempfile::tempdir().unwrap();
        let img = image::GrayImage::from_pixel(32, 32, image::Luma([77u8]));
        img.save(tmp.path().join("ada.png")).unwrap();
        let path = write_directory(
            tmp.path(),
            r#"[{"id": "e1", "display_name": "Ada", "reference_image": "ada.png"}]"#,
        );

        let dir = JsonDirectory::load(&path).unwrap();
        let employee = dir.get("e1").unwrap().unwrap();
        let loaded = dir.load_reference_image(&employee).unwrap().unwrap();
        assert_eq!(loaded.dimensions(), (32, 32));
    }

    #[test]
    fn test_missing_image_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_directory(
            tmp.path(),
            r#"[{"id": "e1", "display_name": "Ada", "reference_image": "gone.png"}]"#,
        );

        let dir = JsonDirectory::load(&path).unwrap();
        let employee = dir.get("e1").unwrap().unwrap();
        assert!(dir.load_reference_image(&employee).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_backend_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_directory(tmp.path(), "not json");
        assert!(JsonDirectory::load(&path).is_err());
    }
}
