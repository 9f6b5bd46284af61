//! Block store collaborator (§6): `get`/`put`/`rm`/`size`, keyed by
//! multihash, opaque bytes. Out of scope per the spec's own framing —
//! this crate ships only so the rest of the workspace has a concrete
//! implementation to integration-test against.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use replog_proto::Hash;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("block store is unreachable")]
    Unreachable,
}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn get(&self, hash: &Hash) -> Result<Option<Bytes>>;
    async fn put(&self, bytes: Bytes) -> Result<Hash>;
    async fn rm(&self, hash: &Hash) -> Result<()>;
    async fn size(&self) -> Result<usize>;
}

/// `dashmap`-backed in-memory block store, content-addressed by `Hash`.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: DashMap<Hash, Bytes>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
        }
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, hash: &Hash) -> Result<Option<Bytes>> {
        Ok(self.blocks.get(hash).map(|entry| entry.value().clone()))
    }

    async fn put(&self, bytes: Bytes) -> Result<Hash> {
        let hash = Hash::of(&bytes);
        self.blocks.insert(hash, bytes);
        Ok(hash)
    }

    async fn rm(&self, hash: &Hash) -> Result<()> {
        self.blocks.remove(hash);
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.blocks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_rm_round_trips() {
        let store = MemoryBlockStore::new();
        let hash = store.put(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(
            store.get(&hash).await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert_eq!(store.size().await.unwrap(), 1);

        store.rm(&hash).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), None);
        assert_eq!(store.size().await.unwrap(), 0);
    }
}
