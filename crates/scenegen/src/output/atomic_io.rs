use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes `bytes` to a sibling partial file, flushes it, then renames it over `path`.
/// Readers never observe a half-written artifact.
pub(crate) fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    let staged = File::create(&partial).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    let result = staged.and_then(|()| commit(&partial, path));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

#[cfg(windows)]
fn commit(partial: &Path, target: &Path) -> io::Result<()> {
    // rename does not replace an existing file here.
    match fs::remove_file(target) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => return Err(error),
        _ => {}
    }
    fs::rename(partial, target)
}

#[cfg(not(windows))]
fn commit(partial: &Path, target: &Path) -> io::Result<()> {
    fs::rename(partial, target)
}

fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{stem}.partial"))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn overwrites_existing_file_and_leaves_no_partial() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("Level.scene.json");
        write_bytes_atomic(&path, b"first").expect("first write");
        write_bytes_atomic(&path, b"second").expect("second write");

        assert_eq!(fs::read(&path).expect("read"), b"second");
        let leftovers = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
