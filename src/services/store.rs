use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

/// Flat-file JSON store: one pretty-printed file per collection, rewritten
/// in full on every save. Writers are serialized by the ledger lock, so the
/// store itself carries no synchronization.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    /// Load a collection, tolerating absence and corruption: a missing file
    /// yields the default, a corrupt one is logged and replaced by the
    /// default on the next save.
    pub async fn load<T: DeserializeOwned + Default>(&self, collection: &str) -> T {
        let path = self.path(collection);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                tracing::error!("failed to read {}: {}", path.display(), e);
                return T::default();
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("failed to decode {}: {}", path.display(), e);
                T::default()
            }
        }
    }

    /// Full-file rewrite of a collection.
    pub async fn save<T: Serialize>(&self, collection: &str, value: &T) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating data dir {}", self.dir.display()))?;
        let path = self.path(collection);
        let raw = serde_json::to_vec_pretty(value)
            .with_context(|| format!("encoding collection {collection}"))?;
        tokio::fs::write(&path, raw)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_store() -> JsonStore {
        let dir = std::env::temp_dir().join(format!("painel-store-{}", uuid::Uuid::new_v4()));
        JsonStore::new(dir)
    }

    #[tokio::test]
    async fn missing_collection_loads_default() {
        let store = temp_store();
        let loaded: HashMap<String, u32> = store.load("nothing").await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = temp_store();
        let mut data = HashMap::new();
        data.insert("a".to_string(), 1u32);
        store.save("numbers", &data).await.unwrap();

        let loaded: HashMap<String, u32> = store.load("numbers").await;
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn corrupt_collection_loads_default() {
        let store = temp_store();
        tokio::fs::create_dir_all(&store.dir).await.unwrap();
        tokio::fs::write(store.path("broken"), b"{ not json")
            .await
            .unwrap();

        let loaded: HashMap<String, u32> = store.load("broken").await;
        assert!(loaded.is_empty());
    }
}
