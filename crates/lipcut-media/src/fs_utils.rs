//! Filesystem helpers for the project layout.
//!
//! Every stage walks directories in name order so runs are reproducible and
//! resumable, hence the sorted listings here.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Sorted paths of the regular files in `dir` whose name passes `filter`.
pub fn list_files_sorted<F>(dir: impl AsRef<Path>, filter: F) -> MediaResult<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MediaError::FileNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(&filter) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Sorted names of every entry in `dir` (files and directories).
pub fn list_names_sorted(dir: impl AsRef<Path>) -> MediaResult<Vec<String>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MediaError::FileNotFound(dir.to_path_buf()));
    }

    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}

/// Sorted immediate sub-directories of `dir`.
pub fn list_subdirs_sorted(dir: impl AsRef<Path>) -> MediaResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MediaError::FileNotFound(dir.to_path_buf()));
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Remove `dir` if present and create it empty.
pub fn recreate_dir(dir: impl AsRef<Path>) -> MediaResult<()> {
    let dir = dir.as_ref();
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Remove a file, ignoring a missing one.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> MediaResult<()> {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// File name of `path` as UTF-8, if it has one.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_files_sorted_filters() {
        let temp = TempDir::new().unwrap();
        for name in ["00002.jpg", "00001.jpg", "notes.txt"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(temp.path().join("sub.jpg")).unwrap();

        let files = list_files_sorted(temp.path(), |name| name.ends_with(".jpg")).unwrap();
        let names: Vec<_> = files.iter().filter_map(|p| file_name_str(p)).collect();
        assert_eq!(names, vec!["00001.jpg", "00002.jpg"]);
    }

    #[test]
    fn test_list_subdirs_sorted() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("b")).unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("c.txt"), b"x").unwrap();

        let dirs = list_subdirs_sorted(temp.path()).unwrap();
        assert_eq!(dirs, vec![temp.path().join("a"), temp.path().join("b")]);
        assert_eq!(list_names_sorted(temp.path()).unwrap(), vec!["a", "b", "c.txt"]);
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        assert!(matches!(
            list_subdirs_sorted(&missing),
            Err(MediaError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_recreate_and_remove() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("buckets");
        fs::create_dir_all(dir.join("1")).unwrap();
        recreate_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(list_names_sorted(&dir).unwrap().is_empty());

        remove_file_if_exists(temp.path().join("video.mp4")).unwrap();
    }
}
