// ABOUTME: Filesystem helpers shared by the workflow and the hosts registry.
// ABOUTME: Writes go through a temp file in the target directory, then a rename.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path`, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
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

/// Async wrapper around [`atomic_write`].
pub async fn write_file(path: &Path, data: impl Into<Vec<u8>>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let data = data.into();
    tokio::task::spawn_blocking(move || atomic_write(&path, &data))
        .await
        .map_err(std::io::Error::other)?
}

/// Remove a directory tree, treating an absent tree as already removed.
pub async fn remove_tree(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config/nginx/conf.d/main.conf");
        atomic_write(&path, b"server {}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "server {}");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        atomic_write(&path, b"A=1").unwrap();
        atomic_write(&path, b"A=2").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=2");
    }

    #[tokio::test]
    async fn remove_tree_tolerates_missing_path() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("site");
        std::fs::create_dir_all(root.join("app/htdocs")).unwrap();

        remove_tree(&root).await.unwrap();
        assert!(!root.exists());
        remove_tree(&root).await.unwrap();
    }
}
