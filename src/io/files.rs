use crate::types::{SpectralError, SpectralResult};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// List files in `dir` ending with `suffix`, optionally also matching `pattern`.
///
/// Results are sorted so repeated runs pick the same file.
pub fn list_files<P: AsRef<Path>>(dir: P, suffix: &str, pattern: Option<&str>) -> SpectralResult<Vec<PathBuf>> {
    let regex = match pattern {
        Some(p) => Some(
            Regex::new(p).map_err(|e| SpectralError::InvalidInput(format!("Invalid file pattern '{}': {}", p, e)))?,
        ),
        None => None,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }
        if let Some(re) = &regex {
            if !re.is_match(name) {
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// First file in `dir` ending with `suffix`
pub fn find_file<P: AsRef<Path>>(dir: P, suffix: &str) -> SpectralResult<PathBuf> {
    list_files(&dir, suffix, None)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            SpectralError::InvalidInput(format!("No *{} file in {}", suffix, dir.as_ref().display()))
        })
}

/// Create `root/dirname` if missing and return its path
pub fn create_dir<P: AsRef<Path>>(root: P, dirname: &str) -> SpectralResult<PathBuf> {
    let path = root.as_ref().join(dirname);
    if !path.exists() {
        log::debug!("Creating directory {}", path.display());
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

/// File name without directory and without any extension (`a.b.tif` -> `a`)
pub fn file_stem(path: &Path) -> SpectralResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SpectralError::InvalidInput(format!("Cannot derive a name from {}", path.display())))
}
