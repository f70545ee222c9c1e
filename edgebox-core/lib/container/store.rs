//! On-disk persistence of container records.

use std::path::{Path, PathBuf};

use edgebox_utils::{CONTAINERS_SUBDIR, CONTAINER_CONFIG_FILENAME};
use tokio::fs;

use crate::EdgeboxResult;

use super::Container;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stores each container as `<meta>/containers/<id>/config.json`.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    root: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerStore {
    /// Creates a store under the given meta path.
    pub fn new(meta_path: impl AsRef<Path>) -> Self {
        Self {
            root: meta_path.as_ref().join(CONTAINERS_SUBDIR),
        }
    }

    /// The directory holding one container's files.
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Reads every stored container. Directories without a readable record are skipped.
    pub async fn load_all(&self) -> EdgeboxResult<Vec<Container>> {
        let mut containers = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(containers),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(CONTAINER_CONFIG_FILENAME);
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_slice::<Container>(&bytes) {
                Ok(container) => containers.push(container),
                Err(e) => tracing::warn!("skipping unreadable container record {}: {}", path.display(), e),
            }
        }

        containers.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(containers)
    }

    /// Writes a container record atomically.
    pub async fn save(&self, container: &Container) -> EdgeboxResult<()> {
        let dir = self.container_dir(&container.id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(CONTAINER_CONFIG_FILENAME);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(container)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Deletes a container's directory.
    pub async fn remove(&self, id: &str) -> EdgeboxResult<()> {
        match fs::remove_dir_all(self.container_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_save_load_remove() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = ContainerStore::new(dir.path());
        assert!(store.load_all().await?.is_empty());

        let container = Container::new("c1", "web").with_extra_host("db:10.0.0.5");
        store.save(&container).await?;
        std::fs::create_dir_all(store.container_dir("half-written"))?;

        let loaded = store.load_all().await?;
        assert_eq!(loaded, vec![container]);

        store.remove("c1").await?;
        store.remove("c1").await?;
        assert!(store.load_all().await?.is_empty());
        Ok(())
    }
}
