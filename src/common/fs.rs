//! File system helpers

use std::fs;
use std::path::Path;

use super::error::{ProxyError, Result};

/// Check that `path` exists and is a regular file
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ProxyError::Config(format!("File not found: {}", path.display())));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!("Path is not a file: {}", path.display())));
    }

    Ok(())
}

/// Read a whole file
///
/// Missing files are configuration errors; anything else the OS reports is
/// returned as an IO error.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    check_file_exists(path)?;

    fs::read(path).map_err(ProxyError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_check_file_exists() {
        let path = PathBuf::from("Cargo.toml");
        assert!(check_file_exists(&path).is_ok());

        let path = PathBuf::from("non_existent_file.txt");
        assert!(matches!(check_file_exists(&path), Err(ProxyError::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        assert!(check_file_exists(dir.path()).is_err(), "A directory is not a file");
    }

    #[test]
    fn test_read_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"-----BEGIN CERTIFICATE-----").unwrap();

        let content = read_file(file.path()).unwrap();
        assert_eq!(content, b"-----BEGIN CERTIFICATE-----");

        assert!(read_file(Path::new("non_existent_file.txt")).is_err());
    }
}
