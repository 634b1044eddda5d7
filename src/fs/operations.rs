use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

/// Sibling path used as the staging file for [write_atomically].
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the contents of `path` so that readers observe either the old or the new contents,
/// never a partial write. Parent directories are created as needed.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|v| !v.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {parent:?}"))?;
    }

    let staging = staging_path(path);
    let mut file = tokio::fs::File::create(&staging)
        .await
        .with_context(|| format!("Failed to create {staging:?}"))?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&staging, path)
        .await
        .with_context(|| format!("Failed to move {staging:?} to {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{staging_path, write_atomically};

    #[test]
    fn test_staging_path_is_sibling() {
        assert_eq!(
            staging_path(Path::new("/tmp/state/input-counts.json")),
            Path::new("/tmp/state/input-counts.json.tmp")
        );
    }

    #[tokio::test]
    async fn test_write_creates_parents() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/deeper/state.json");

        write_atomically(&path, b"first").await?;

        assert_eq!(tokio::fs::read(&path).await?, b"first");
        assert!(!staging_path(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_replaces_contents() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("state.json");

        write_atomically(&path, b"a much longer first version").await?;
        write_atomically(&path, b"short").await?;

        assert_eq!(tokio::fs::read(&path).await?, b"short");
        Ok(())
    }
}
