pub mod chunker;
pub mod walker;

use std::path::{Path, PathBuf};

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::rag::embeddings::Embed;
use crate::rag::vector_store::{VectorRecord, VectorStore};
use chunker::TextSplitter;

/// Outcome of one indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub processed: usize,
    pub total_chunks: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Stable id prefix for a file, so re-indexing overwrites its earlier chunks.
pub fn file_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Splits one file and upserts its chunks, embedding `batch_size` at a time.
/// Returns the number of chunks written.
pub async fn index_file(
    path: &Path,
    splitter: &TextSplitter,
    batch_size: usize,
    embeddings: &dyn Embed,
    store: &dyn VectorStore,
) -> Result<usize> {
    let text = tokio::fs::read_to_string(path).await?;
    let chunks = splitter.split(&text);
    if chunks.is_empty() {
        return Ok(0);
    }

    let path_id = file_id(path);
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embeddings.generate(texts).await?;

        let records = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                let metadata = serde_json::json!({
                    "source": path.to_string_lossy(),
                    "chunk_index": chunk.chunk_index,
                });
                VectorRecord {
                    id: format!("{}-{}", path_id, chunk.chunk_index),
                    values,
                    text: chunk.text.clone(),
                    metadata: metadata.as_object().cloned().unwrap_or_default(),
                }
            })
            .collect();
        store.upsert(records).await?;
    }

    Ok(chunks.len())
}

/// Indexes every file in turn. A file that fails is recorded in the report
/// and the run moves on. `on_file` is called after each file.
pub async fn index_files(
    files: &[PathBuf],
    splitter: &TextSplitter,
    batch_size: usize,
    embeddings: &dyn Embed,
    store: &dyn VectorStore,
    mut on_file: impl FnMut(&Path),
) -> IndexReport {
    let mut report = IndexReport::default();

    for path in files {
        match index_file(path, splitter, batch_size, embeddings, store).await {
            Ok(chunk_count) => {
                report.processed += 1;
                report.total_chunks += chunk_count;
            }
            Err(e) => {
                tracing::warn!("Failed to process {}: {}", path.display(), e);
                report.failed.push((path.clone(), e.to_string()));
            }
        }
        on_file(path);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::rag::vector_store::MockVectorStore;

    /// Returns a fixed vector per text and records batch sizes.
    #[derive(Default)]
    struct CountingEmbed {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Embed for CountingEmbed {
        async fn generate(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|_| vec![0.25; 4]).collect())
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lila-{}-{}", label, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Store that records the ids of every upsert call.
    fn recording_store(fail_on: Option<&'static str>) -> (MockVectorStore, Arc<Mutex<Vec<Vec<String>>>>) {
        let upserts = Arc::new(Mutex::new(Vec::new()));
        let recorded = upserts.clone();
        let mut store = MockVectorStore::new();
        store.expect_upsert().returning(move |records| {
            if let Some(marker) = fail_on {
                if records.iter().any(|r| r.text.contains(marker)) {
                    anyhow::bail!("upsert rejected");
                }
            }
            recorded
                .lock()
                .unwrap()
                .push(records.into_iter().map(|r| r.id).collect());
            Ok(())
        });
        (store, upserts)
    }

    #[test]
    fn test_file_id_is_stable() {
        let path = Path::new("notes/tea.md");
        assert_eq!(file_id(path), file_id(Path::new("notes/tea.md")));
        assert_eq!(file_id(path).len(), 16);
        assert_ne!(file_id(path), file_id(Path::new("notes/coffee.md")));
    }

    #[tokio::test]
    async fn test_chunks_are_batched_with_stable_ids() {
        let dir = temp_dir("indexer");
        let path = dir.join("letters.txt");
        std::fs::write(&path, "a b c d e f g h i j").unwrap();

        let splitter = TextSplitter::new(5, 2).unwrap();
        let embed = CountingEmbed::default();
        let (store, upserts) = recording_store(None);

        let count = index_file(&path, &splitter, 2, &embed, &store).await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(*embed.batches.lock().unwrap(), vec![2, 2, 1]);

        let prefix = file_id(&path);
        let ids: Vec<String> = upserts.lock().unwrap().concat();
        let expected: Vec<String> = (0..5).map(|i| format!("{}-{}", prefix, i)).collect();
        assert_eq!(ids, expected);
        assert_eq!(upserts.lock().unwrap().len(), 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_empty_file_writes_nothing() {
        let dir = temp_dir("indexer-empty");
        let path = dir.join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let splitter = TextSplitter::new(100, 10).unwrap();
        let mut store = MockVectorStore::new();
        store.expect_upsert().times(0);

        let count = index_file(&path, &splitter, 8, &CountingEmbed::default(), &store)
            .await
            .unwrap();
        assert_eq!(count, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_file_does_not_stop_the_run() {
        let dir = temp_dir("indexer-run");
        let good = dir.join("good.txt");
        let rejected = dir.join("rejected.txt");
        std::fs::write(&good, "Lila likes tea").unwrap();
        std::fs::write(&rejected, "poison pill").unwrap();
        let files = vec![dir.join("missing.txt"), rejected.clone(), good.clone()];

        let splitter = TextSplitter::new(100, 10).unwrap();
        let (store, upserts) = recording_store(Some("poison"));
        let mut seen = Vec::new();

        let report = index_files(&files, &splitter, 4, &CountingEmbed::default(), &store, |path| {
            seen.push(path.to_path_buf())
        })
        .await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.total_chunks, 1);
        let failed: Vec<&PathBuf> = report.failed.iter().map(|(path, _)| path).collect();
        assert_eq!(failed, vec![&files[0], &rejected]);
        assert!(report.failed[1].1.contains("upsert rejected"));
        assert_eq!(seen, files);
        assert_eq!(*upserts.lock().unwrap(), vec![vec![format!("{}-0", file_id(&good))]]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
