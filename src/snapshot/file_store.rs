//! 文件快照存储
//!
//! 目录结构：`manifests.jsonl`（每行一个 manifest，只追加）与 `blobs/<id>.json`（以 create_new 写入，只写一次）。
//! 先写 blob 再追加 manifest，manifest 可见即意味着 blob 已落盘。
//! manifest 索引在 open 时载入内存，之后由 put 维护；同一目录只应有一个写入者。

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

use crate::core::SnapshotError;
use crate::snapshot::manifest::{ManifestQuery, ManifestScan, SnapshotManifest};
use crate::snapshot::storage::SnapshotStorage;

const MANIFEST_FILE: &str = "manifests.jsonl";
const BLOB_DIR: &str = "blobs";

#[derive(Default)]
struct ManifestIndex {
    /// 写入顺序
    manifests: Vec<SnapshotManifest>,
    by_id: HashMap<String, usize>,
}

impl ManifestIndex {
    fn push(&mut self, manifest: SnapshotManifest) {
        self.by_id.insert(manifest.id.clone(), self.manifests.len());
        self.manifests.push(manifest);
    }

    fn get(&self, id: &str) -> Option<&SnapshotManifest> {
        self.by_id.get(id).map(|&i| &self.manifests[i])
    }
}

pub struct FileSnapshotStorage {
    root: PathBuf,
    index: RwLock<ManifestIndex>,
    /// 串行化进程内的追加写
    write_lock: Mutex<()>,
}

impl FileSnapshotStorage {
    /// 打开（必要时创建）存储目录并载入 manifest 索引
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(BLOB_DIR)).await?;
        let index = read_index(&root.join(MANIFEST_FILE)).await?;
        tracing::debug!(root = ?root, manifests = index.manifests.len(), "file snapshot storage opened");
        Ok(Self {
            root,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn blob_path(&self, blob_ref: &str) -> Option<PathBuf> {
        valid_key(blob_ref).then(|| self.root.join(BLOB_DIR).join(format!("{blob_ref}.json")))
    }

    /// 追加一行 manifest；文件末尾若是中断留下的半行，先补换行把它隔开
    async fn append_line(&self, manifest: &SnapshotManifest) -> Result<(), SnapshotError> {
        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(self.manifest_path())
            .await?;

        let mut line = String::new();
        if file.metadata().await?.len() > 0 {
            file.seek(SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                tracing::warn!("manifest index ends with a torn line, starting a new line");
                line.push('\n');
            }
        }
        line.push_str(&serde_json::to_string(manifest)?);
        line.push('\n');

        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}

async fn read_index(path: &Path) -> Result<ManifestIndex, SnapshotError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ManifestIndex::default()),
        Err(e) => return Err(e.into()),
    };
    let mut index = ManifestIndex::default();
    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SnapshotManifest>(line) {
            Ok(m) => index.push(m),
            // 进程中断可能留下半行，跳过但记录
            Err(e) => tracing::warn!(line = line_no + 1, "skipping corrupt manifest line: {}", e),
        }
    }
    Ok(index)
}

/// 只允许字母数字、`_`、`-`，防止路径逃逸
fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl SnapshotStorage for FileSnapshotStorage {
    async fn put(&self, manifest: &SnapshotManifest, blob: Vec<u8>) -> Result<(), SnapshotError> {
        let blob_path = self
            .blob_path(&manifest.blob_ref)
            .ok_or_else(|| SnapshotError::Backend(format!("invalid blob ref: {}", manifest.blob_ref)))?;
        if !valid_key(&manifest.id) {
            return Err(SnapshotError::Backend(format!("invalid snapshot id: {}", manifest.id)));
        }

        let _guard = self.write_lock.lock().await;
        if self.index.read().await.get(&manifest.id).is_some() {
            return Err(SnapshotError::DuplicateId(manifest.id.clone()));
        }

        let mut blob_file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&blob_path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SnapshotError::DuplicateId(manifest.id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        blob_file.write_all(&blob).await?;
        blob_file.sync_all().await?;

        self.append_line(manifest).await?;
        self.index.write().await.push(manifest.clone());
        Ok(())
    }

    async fn manifest(&self, id: &str) -> Result<Option<SnapshotManifest>, SnapshotError> {
        Ok(self.index.read().await.get(id).cloned())
    }

    async fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        let Some(blob_ref) = self.index.read().await.get(id).map(|m| m.blob_ref.clone()) else {
            return Ok(None);
        };
        let Some(path) = self.blob_path(&blob_ref) else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn scan(&self, query: &ManifestQuery) -> Result<ManifestScan, SnapshotError> {
        let matched = self
            .index
            .read()
            .await
            .manifests
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        Ok(ManifestScan::from_matched(matched, query.limit))
    }
}
