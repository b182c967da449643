//! Cached fingerprint (`.versum`)

use crate::fingerprint::SourceFingerprint;
use crate::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Default cache file name, relative to the project directory.
pub const CACHE_FILE: &str = ".versum";

/// Read the fingerprint recorded by the previous regeneration.
///
/// A missing file is not an error: it just means there is no cache yet.
pub fn read_cached(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cached = content.trim().to_string();
            Ok((!cached.is_empty()).then_some(cached))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No cached fingerprint at {:?}", path);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Record `fingerprint` as the last regenerated state.
pub fn write_cached(path: &Path, fingerprint: &SourceFingerprint) -> Result<()> {
    write_atomic(path, fingerprint.as_str().as_bytes())
}

/// Replace `path` with `data` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_cache_is_none() {
        let dir = tempdir().unwrap();
        let cached = read_cached(&dir.path().join(CACHE_FILE)).unwrap();
        assert!(cached.is_none());
    }

    #[test]
    fn test_write_then_read_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        let fp = SourceFingerprint("0123456789abcdef0123456789abcdef01234567".to_string());

        write_cached(&path, &fp).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), fp.0);
        assert_eq!(read_cached(&path).unwrap(), Some(fp.0));
    }

    #[test]
    fn test_trailing_newline_trimmed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        std::fs::write(&path, "abc\n").unwrap();
        assert_eq!(read_cached(&path).unwrap(), Some("abc".to_string()));
    }

    #[test]
    fn test_blank_cache_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        std::fs::write(&path, "  \n").unwrap();
        assert!(read_cached(&path).unwrap().is_none());
    }
}
