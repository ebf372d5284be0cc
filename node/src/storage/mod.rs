use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::store::Document;

/// Write-through archive of store documents in a sled database, so a node
/// restarts with the state it committed.
#[derive(Clone)]
pub struct DocumentArchive {
    db: sled::Db,
}

impl DocumentArchive {
    const TREE: &'static str = "documents";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create storage directory {:?}", path))?;
        let db = sled::open(path)
            .with_context(|| format!("failed to open sled database at {:?}", path))?;
        Ok(Self { db })
    }

    fn tree(&self) -> sled::Result<sled::Tree> {
        self.db.open_tree(Self::TREE)
    }

    fn key(collection: &str, id: &str) -> Vec<u8> {
        format!("{collection}/{id}").into_bytes()
    }

    /// Stage one committed batch. sled applies the whole batch or none of it;
    /// it reaches disk on the next [`DocumentArchive::flush`].
    pub fn write(&self, documents: &[(&str, &Document)]) -> Result<()> {
        let tree = self.tree()?;
        let mut batch = sled::Batch::default();
        for (collection, document) in documents {
            let encoded = serde_json::to_vec(&document.data)
                .with_context(|| format!("failed to encode {collection}/{}", document.id))?;
            batch.insert(Self::key(collection, &document.id), encoded);
        }
        tree.apply_batch(batch)?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.tree()?
            .flush_async()
            .await
            .context("failed to flush document archive")?;
        Ok(())
    }

    /// Every archived document as `(collection, document)`.
    pub fn load_all(&self) -> Result<Vec<(String, Document)>> {
        let tree = self.tree()?;
        let mut documents = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            let key = String::from_utf8(key.to_vec()).context("stored key was not valid UTF-8")?;
            let Some((collection, id)) = key.split_once('/') else {
                continue;
            };
            let data: Map<String, Value> = serde_json::from_slice(&value)
                .with_context(|| format!("failed to decode archived document {key}"))?;
            documents.push((collection.to_owned(), Document::new(id, data)));
        }
        Ok(documents)
    }
}
