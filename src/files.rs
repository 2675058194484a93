//! Gathering uploads from the local filesystem for the CLI.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use docqa_core::models::{IngestFile, SkippedFile};

/// Read one file as an upload named after its file name.
pub fn read_file(path: &Path) -> Result<IngestFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(IngestFile::from_name(bytes, name))
}

/// Files under `root` matching any include pattern, in sorted path order.
///
/// Patterns are matched case-insensitively against the path relative to
/// `root`, so `**/*.pdf` also picks up `Report.PDF`.
pub fn collect_dir(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }
    let include_set = build_globset(include_globs)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if include_set.is_match(relative) {
            paths.push(entry.path().to_path_buf());
        }
    }
    Ok(paths)
}

/// Uploads gathered from disk, plus the paths that could not be read.
///
/// An unreadable path is reported the same way as a file the loader
/// rejects, so one bad path never keeps the rest of a batch from loading.
#[derive(Debug, Default)]
pub struct Uploads {
    pub files: Vec<IngestFile>,
    pub unreadable: Vec<SkippedFile>,
}

impl Uploads {
    /// Read one file, recording it as unreadable on failure.
    pub fn add_file(&mut self, path: &Path) {
        match read_file(path) {
            Ok(file) => self.files.push(file),
            Err(e) => self.skip(display_name(path), e),
        }
    }

    /// Read every matching file under `root`. Uploads are named by their path
    /// relative to `root`, so equal file names in different folders stay apart.
    ///
    /// Fails only when `root` cannot be walked at all or a pattern is invalid.
    pub fn add_dir(&mut self, root: &Path, include_globs: &[String]) -> Result<()> {
        for path in collect_dir(root, include_globs)? {
            let name = path
                .strip_prefix(root)
                .map(|relative| relative.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| display_name(&path));
            match read_file(&path) {
                Ok(mut file) => {
                    file.name = name;
                    self.files.push(file);
                }
                Err(e) => self.skip(name, e),
            }
        }
        Ok(())
    }

    fn skip(&mut self, name: String, error: anyhow::Error) {
        tracing::warn!(name = %name, error = %error, "cannot read file");
        self.unreadable.push(SkippedFile {
            name,
            reason: format!("{:#}", error),
        });
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid include pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_globs() -> Vec<String> {
        crate::config::IngestConfig::default().include_globs
    }

    #[test]
    fn test_collect_dir_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.TXT"), "a").unwrap();
        std::fs::write(tmp.path().join("image.png"), "x").unwrap();
        std::fs::write(tmp.path().join("sub").join("c.docx"), "c").unwrap();

        let found = collect_dir(tmp.path(), &default_globs()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.txt", "sub/c.docx"]);
    }

    #[test]
    fn test_add_dir_names_relative_paths() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes").join("paris.txt"), "Paris").unwrap();

        let mut uploads = Uploads::default();
        uploads.add_dir(tmp.path(), &default_globs()).unwrap();
        assert!(uploads.unreadable.is_empty());
        assert_eq!(uploads.files.len(), 1);
        assert_eq!(uploads.files[0].name, "notes/paris.txt");
        assert_eq!(uploads.files[0].declared_type, "txt");
        assert_eq!(uploads.files[0].bytes, b"Paris");
    }

    #[test]
    fn test_missing_file_is_recorded_not_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let good = tmp.path().join("france.txt");
        std::fs::write(&good, "Paris").unwrap();

        let mut uploads = Uploads::default();
        uploads.add_file(&good);
        uploads.add_file(&tmp.path().join("gone.txt"));
        assert_eq!(uploads.files.len(), 1);
        assert_eq!(uploads.files[0].name, "france.txt");
        assert_eq!(uploads.unreadable.len(), 1);
        assert_eq!(uploads.unreadable[0].name, "gone.txt");
        assert!(uploads.unreadable[0].reason.contains("Failed to read"));
    }

    #[test]
    fn test_collect_dir_missing_root() {
        assert!(collect_dir(Path::new("/definitely/not/here"), &default_globs()).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = collect_dir(tmp.path(), &["[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Invalid include pattern"));
    }
}
