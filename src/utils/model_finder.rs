use crate::error::{Result, ScopeError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions recognised as detector weights.
pub const SUPPORTED_MODEL_EXTENSIONS: [&str; 4] = ["pt", "pth", "onnx", "engine"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ModelFile {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for ModelFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1}MB)", self.path.display(), self.size_mb())
    }
}

pub struct ModelFinder;

impl ModelFinder {
    /// Check that the configured model exists and describe it.
    pub fn inspect(model_path: &Path) -> Result<ModelFile> {
        match fs::metadata(model_path) {
            Ok(metadata) if metadata.is_file() => {
                let model = ModelFile {
                    path: model_path.to_path_buf(),
                    size_bytes: metadata.len(),
                };
                info!("Using model {}", model);
                Ok(model)
            }
            Ok(_) => Err(ScopeError::ModelNotFound(model_path.to_path_buf())),
            Err(e) => {
                debug!("Model {:?} is not accessible: {}", model_path, e);
                Err(ScopeError::ModelNotFound(model_path.to_path_buf()))
            }
        }
    }

    /// Local model files in `base_dir` and `base_dir/models_folder`, de-duplicated and sorted.
    pub fn discover(base_dir: &Path, models_folder: &Path) -> Result<Vec<ModelFile>> {
        let mut found = Self::scan_dir(base_dir)?;

        let folder = if models_folder.is_absolute() {
            models_folder.to_path_buf()
        } else {
            base_dir.join(models_folder)
        };
        if folder.is_dir() {
            found.extend(Self::scan_dir(&folder)?);
        } else {
            debug!("Models folder {:?} does not exist", folder);
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        found.dedup_by(|a, b| a.path == b.path);

        Ok(found)
    }

    fn scan_dir(dir: &Path) -> Result<Vec<ModelFile>> {
        let mut models = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !Self::has_supported_extension(&path) {
                continue;
            }

            let metadata = entry.metadata()?;
            if metadata.is_file() {
                debug!("Found model file: {:?}", path);
                models.push(ModelFile {
                    path,
                    size_bytes: metadata.len(),
                });
            }
        }

        Ok(models)
    }

    pub fn has_supported_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                SUPPORTED_MODEL_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_missing_model() {
        let result = ModelFinder::inspect(Path::new("/non/existent/model.onnx"));
        assert!(matches!(result, Err(ScopeError::ModelNotFound(_))));
    }

    #[test]
    fn test_inspect_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.onnx");
        fs::write(&path, vec![0u8; 2 * 1024 * 1024]).unwrap();

        let model = ModelFinder::inspect(&path).unwrap();
        assert_eq!(model.size_bytes, 2 * 1024 * 1024);
        assert!(model.to_string().ends_with("(2.0MB)"));
    }

    #[test]
    fn test_discover_scans_root_and_models_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("yolov8n.pt"), b"w").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("models")).unwrap();
        fs::write(dir.path().join("models").join("best.ONNX"), b"w").unwrap();
        fs::write(dir.path().join("models").join("fast.engine"), b"w").unwrap();

        let models = ModelFinder::discover(dir.path(), Path::new("models")).unwrap();
        let names: Vec<String> = models
            .iter()
            .map(|m| m.path.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();

        assert_eq!(
            names,
            vec!["models/best.ONNX", "models/fast.engine", "yolov8n.pt"]
        );
    }

    #[test]
    fn test_discover_without_models_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pth"), b"w").unwrap();

        let models = ModelFinder::discover(dir.path(), Path::new("models")).unwrap();
        assert_eq!(models.len(), 1);
    }
}
