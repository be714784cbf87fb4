//! File helpers for sourcing a POST body and saving a response.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::Error;

pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, Error> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| file_error(path, e))?;
    debug!("read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

pub fn write_all<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), Error> {
    let path = path.as_ref();
    fs::write(path, data).map_err(|e| file_error(path, e))?;
    debug!("wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

fn file_error(path: &Path, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(PathBuf::from(path)),
        io::ErrorKind::PermissionDenied => Error::PermissionDenied(PathBuf::from(path)),
        io::ErrorKind::OutOfMemory => Error::OutOfMemory,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ErrorKind;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        write_all(&path, br#"{"key":"value"}"#).unwrap();
        assert_eq!(read_all(&path).unwrap(), br#"{"key":"value"}"#);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_all(dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.to_string().ends_with("nope"));
    }

    #[test]
    fn missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_all(dir.path().join("a/b/out.txt"), b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }
}
