use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use crate::{ItemSource, ItemStream, SourceError};

/// A source whose items are files under a root directory.
///
/// Item paths are relative to the root. Absolute paths and `..` components are
/// rejected so an item can never name a file outside the root.
#[derive(Debug, Clone)]
pub struct LocalDiskSource {
    root: PathBuf,
}

impl LocalDiskSource {
    pub fn new(root: impl Into<PathBuf>) -> Result<LocalDiskSource, SourceError> {
        let root = root.into();
        let attr = fs::metadata(&root).map_err(|error| SourceError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        if !attr.is_dir() {
            return Err(SourceError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root path must be a directory."),
            });
        }

        match root.canonicalize() {
            Ok(root) => Ok(LocalDiskSource { root }),
            Err(error) => Err(SourceError::RootPathInvalid { path: root, error }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn item_path_to_file_path(&self, path: &str) -> Result<PathBuf, SourceError> {
        let mut file_path = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => file_path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(SourceError::InvalidPath {
                        path: path.to_string(),
                        message: "item paths must be relative and stay under the root"
                            .to_string(),
                    });
                }
            }
        }

        if file_path == self.root {
            return Err(SourceError::InvalidPath {
                path: path.to_string(),
                message: "item path is empty".to_string(),
            });
        }
        Ok(file_path)
    }
}

fn not_found_as_item_error(error: io::Error, path: &str) -> SourceError {
    if error.kind() == io::ErrorKind::NotFound {
        SourceError::ItemNotFound {
            path: path.to_string(),
        }
    } else {
        SourceError::Io(error)
    }
}

impl ItemSource for LocalDiskSource {
    fn open_range(&self, path: &str, offset: u64, length: u64) -> Result<ItemStream, SourceError> {
        let file_path = self.item_path_to_file_path(path)?;
        tracing::debug!(file = %file_path.display(), offset, length, "opening item range");

        let mut file = fs::File::open(&file_path).map_err(|e| not_found_as_item_error(e, path))?;
        let size = file.metadata()?.len();
        if offset > size {
            return Err(SourceError::RangeOutOfBounds {
                path: path.to_string(),
                offset,
                size,
            });
        }

        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(file.take(length)))
    }
}

#[cfg(feature = "async")]
mod async_impl {
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::{not_found_as_item_error, LocalDiskSource};
    use crate::{AsyncItemSource, AsyncItemStream, SourceError};

    #[async_trait]
    impl AsyncItemSource for LocalDiskSource {
        async fn open_range_async(
            &self,
            path: &str,
            offset: u64,
            length: u64,
        ) -> Result<AsyncItemStream, SourceError> {
            let file_path = self.item_path_to_file_path(path)?;
            tracing::debug!(file = %file_path.display(), offset, length, "opening item range");

            let mut file = tokio::fs::File::open(&file_path)
                .await
                .map_err(|e| not_found_as_item_error(e, path))?;
            let size = file.metadata().await?.len();
            if offset > size {
                return Err(SourceError::RangeOutOfBounds {
                    path: path.to_string(),
                    offset,
                    size,
                });
            }

            file.seek(std::io::SeekFrom::Start(offset)).await?;
            Ok(Box::new(file.take(length)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with_file(contents: &[u8]) -> (tempfile::TempDir, LocalDiskSource) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/item.bin"), contents).unwrap();
        let source = LocalDiskSource::new(dir.path()).unwrap();
        (dir, source)
    }

    #[test]
    fn reads_a_range_of_a_file() {
        let (_dir, source) = source_with_file(b"the quick brown fox");
        let mut out = String::new();
        source
            .open_range("nested/item.bin", 4, 5)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "quick");
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            LocalDiskSource::new(&file),
            Err(SourceError::RootPathInvalid { .. })
        ));
        assert!(matches!(
            LocalDiskSource::new(dir.path().join("missing")),
            Err(SourceError::RootPathInvalid { .. })
        ));
    }

    #[test]
    fn rejects_paths_escaping_the_root() {
        let (_dir, source) = source_with_file(b"x");
        for bad in ["../etc/passwd", "/etc/passwd", "nested/../../x", ""] {
            let err = source.open_range(bad, 0, 1).err().unwrap();
            assert!(
                matches!(err, SourceError::InvalidPath { .. }),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn missing_file_is_item_not_found() {
        let (_dir, source) = source_with_file(b"x");
        let err = source.open_range("nested/other.bin", 0, 1).err().unwrap();
        assert!(matches!(err, SourceError::ItemNotFound { .. }));
    }

    #[test]
    fn offset_past_end_fails() {
        let (_dir, source) = source_with_file(b"abc");
        let err = source.open_range("nested/item.bin", 4, 1).err().unwrap();
        assert!(matches!(err, SourceError::RangeOutOfBounds { size: 3, .. }));
    }
}
