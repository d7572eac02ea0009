use anyhow::{Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use xbag_core::HyperCodebook;

use crate::codebook_file;

/// A codebook file on disk, replaced atomically on every save
pub struct CodebookStore {
    path: PathBuf,
}

impl CodebookStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, hyper: &HyperCodebook) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let text = codebook_file::encode(hyper)
            .with_context(|| format!("cannot encode codebook for {}", self.path.display()))?;
        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(text.as_bytes()))
            .with_context(|| format!("failed to write codebook to {}", self.path.display()))?;

        info!("Saved codebook ({} bytes) to {:?}", text.len(), self.path);
        Ok(())
    }

    pub fn load(&self) -> Result<HyperCodebook> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read codebook from {}", self.path.display()))?;
        let hyper = codebook_file::decode(&text)
            .with_context(|| format!("failed to parse codebook {}", self.path.display()))?;
        info!("Loaded codebook from {:?}", self.path);
        Ok(hyper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xbag_core::{
        AssignmentConfig, Codebook, NumericCodebook, Scaler, TermWeighting, Vector,
    };

    fn sample() -> HyperCodebook {
        HyperCodebook {
            input_scaler: Some(Scaler::from_rows(false, vec![0.0, -1.5], vec![2.0, 0.125]).unwrap()),
            weighting: TermWeighting {
                log: false,
                idf: true,
                document_frequency: Some(vec![0.1, 0.7]),
            },
            codebooks: vec![Codebook::Numeric(
                NumericCodebook::from_parts(
                    vec![Vector::new(vec![0.1, 0.2]), Vector::new(vec![1.0 / 3.0, 7.5])],
                    None,
                    None,
                    AssignmentConfig::default(),
                )
                .unwrap(),
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = CodebookStore::new(dir.path().join("nested").join("book.cb"));
        assert!(!store.exists());

        let hyper = sample();
        store.save(&hyper).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), hyper);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = CodebookStore::new(dir.path().join("book.cb"));
        store.save(&sample()).unwrap();
        store.save(&HyperCodebook::default()).unwrap();
        assert_eq!(store.load().unwrap(), HyperCodebook::default());
    }

    #[test]
    fn test_load_reports_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.cb");
        fs::write(&path, "codebookNumeric\n3;1\n0.5\n").unwrap();
        let err = CodebookStore::new(&path).load().unwrap_err();
        assert!(err.root_cause().to_string().contains("line 4"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(CodebookStore::new(dir.path().join("absent.cb")).load().is_err());
    }
}
