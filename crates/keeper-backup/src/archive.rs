//! Checksum and sidecar helpers for backup archives.
//!
//! Sidecars use the `SHA256SUMS` line format (`<hex>  <filename>`), so an
//! operator can verify an artifact with standard tools.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a file, streaming.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `<artifact>.sha256`, next to the archive.
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Write the sidecar checksum file for `artifact`.
pub fn write_sidecar(artifact: &Path, checksum: &str) -> io::Result<PathBuf> {
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = sidecar_path(artifact);
    std::fs::write(&path, format!("{checksum}  {file_name}\n"))?;
    Ok(path)
}

/// Read the checksum recorded for `artifact` in its sidecar, if present.
///
/// Accepts any line whose filename column matches the artifact, so a
/// combined SHA256SUMS file copied next to the archive also works.
pub fn read_sidecar(artifact: &Path) -> io::Result<Option<String>> {
    let path = sidecar_path(artifact);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for line in content.lines() {
        let parts: Vec<&str> = line.splitn(2, char::is_whitespace).collect();
        if parts.len() == 2 && parts[1].trim() == file_name {
            return Ok(Some(parts[0].to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("keeper_backup_20260314_030000.tar.gz");
        std::fs::write(&artifact, b"archive-bytes").unwrap();

        write_sidecar(&artifact, "abc123").unwrap();
        assert_eq!(read_sidecar(&artifact).unwrap(), Some("abc123".to_string()));
    }

    #[test]
    fn missing_sidecar_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("keeper_backup_20260314_030000.tar.gz");
        assert_eq!(read_sidecar(&artifact).unwrap(), None);
    }

    #[test]
    fn sidecar_with_other_filenames_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.tar.gz");
        std::fs::write(sidecar_path(&artifact), "def456  b.tar.gz\n").unwrap();
        assert_eq!(read_sidecar(&artifact).unwrap(), None);
    }
}
