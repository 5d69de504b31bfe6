use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::storage::{Entry, MemoryStore};

/// 快照文件 Header
const MAGIC: u32 = 0x4849_5831; // "HIX1"
const VERSION_CURRENT: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 4; // magic + version + state + data_len + checksum

#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    entries: Vec<Entry>,
}

/// MemoryStore 的原子快照（atomic replacement）
///
/// 落盘流程：
/// 1) 写 `<path>.tmp` 的 INCOMPLETE header（len/checksum 先置 0）
/// 2) `bincode::serialize_into` 流式写 body，边写边算 checksum / data_len
/// 3) seek 回开头覆盖 COMMITTED header
/// 4) fsync(tmpfile)
/// 5) rename(tmp, target)
/// 6) fsync(dir)
///
/// 加载时校验 magic + version + state + data_len + checksum，任何不一致都视为无快照。
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

struct SimpleChecksum {
    hash: u32,
    pending: [u8; 4],
    pending_len: usize,
}

impl SimpleChecksum {
    fn new() -> Self {
        Self {
            hash: 0,
            pending: [0u8; 4],
            pending_len: 0,
        }
    }

    fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let need = 4 - self.pending_len;
            let take = need.min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];

            if self.pending_len == 4 {
                self.process_chunk(self.pending);
                self.pending_len = 0;
                self.pending = [0u8; 4];
            }
        }

        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            self.process_chunk([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let rest = chunks.remainder();
        if !rest.is_empty() {
            self.pending[..rest.len()].copy_from_slice(rest);
            self.pending_len = rest.len();
        }
    }

    fn finalize(mut self) -> u32 {
        if self.pending_len > 0 {
            let mut buf = [0u8; 4];
            buf[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
            self.process_chunk(buf);
        }
        self.hash
    }

    fn process_chunk(&mut self, chunk: [u8; 4]) {
        self.hash = self.hash.wrapping_add(u32::from_le_bytes(chunk));
        self.hash = self.hash.rotate_left(7);
    }
}

struct ChecksumWriter<'a, W: Write> {
    inner: &'a mut W,
    checksum: SimpleChecksum,
    bytes: u64,
}

impl<'a, W: Write> ChecksumWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            checksum: SimpleChecksum::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, u32) {
        (self.bytes, self.checksum.finalize())
    }
}

impl<'a, W: Write> Write for ChecksumWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.checksum.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn header(state: u32, data_len: u32, checksum: u32) -> [u8; HEADER_SIZE] {
    let mut h = [0u8; HEADER_SIZE];
    h[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    h[4..8].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
    h[8..12].copy_from_slice(&state.to_le_bytes());
    h[12..16].copy_from_slice(&data_len.to_le_bytes());
    h[16..20].copy_from_slice(&checksum.to_le_bytes());
    h
}

fn read_u32(data: &[u8], at: usize) -> anyhow::Result<u32> {
    Ok(u32::from_le_bytes(data[at..at + 4].try_into()?))
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载快照；文件缺失或校验失败都返回 None（由上层以空 store 启动）
    pub async fn load_if_valid(&self) -> anyhow::Result<Option<MemoryStore>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let data = fs::read(&self.path).await?;
        if data.len() < HEADER_SIZE {
            tracing::warn!("Snapshot too small, ignoring");
            return Ok(None);
        }

        let magic = read_u32(&data, 0)?;
        let version = read_u32(&data, 4)?;
        let state = read_u32(&data, 8)?;
        let data_len = read_u32(&data, 12)? as usize;
        let stored_checksum = read_u32(&data, 16)?;

        if magic != MAGIC {
            tracing::warn!("Snapshot magic mismatch: {:#x} != {:#x}", magic, MAGIC);
            return Ok(None);
        }
        if version != VERSION_CURRENT {
            tracing::warn!(
                "Snapshot version mismatch: {} != {}",
                version,
                VERSION_CURRENT
            );
            return Ok(None);
        }
        if state != STATE_COMMITTED {
            tracing::warn!("Snapshot state INCOMPLETE, ignoring");
            return Ok(None);
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != data_len {
            tracing::warn!("Snapshot data length mismatch");
            return Ok(None);
        }

        let computed = simple_checksum(body);
        if computed != stored_checksum {
            tracing::warn!(
                "Snapshot checksum mismatch: {} != {}",
                computed,
                stored_checksum
            );
            return Ok(None);
        }

        match bincode::deserialize::<StoreSnapshot>(body) {
            Ok(snap) => {
                tracing::info!("Loaded store snapshot: {} keys", snap.entries.len());
                Ok(Some(MemoryStore::from_entries(snap.entries)))
            }
            Err(e) => {
                tracing::warn!("Snapshot deserialize failed: {}", e);
                Ok(None)
            }
        }
    }

    /// 原子写入快照
    pub async fn write_atomic(&self, store: &MemoryStore) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let snap = StoreSnapshot {
            entries: store.entries(),
        };
        let path = self.path.clone();
        let key_count = snap.entries.len();

        // 同步文件 IO 放到 blocking 线程，避免占住 runtime worker
        let total = tokio::task::spawn_blocking(move || write_file(&path, &snap)).await??;

        tracing::info!("Snapshot written: {} keys, {} bytes", key_count, total);
        Ok(())
    }
}

fn write_file(path: &Path, snap: &StoreSnapshot) -> anyhow::Result<usize> {
    let tmp_path = path.with_extension("tmp");

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(&header(STATE_INCOMPLETE, 0, 0))?;

    let (data_len_u64, checksum) = {
        let mut cw = ChecksumWriter::new(&mut file);
        bincode::serialize_into(&mut cw, snap)?;
        cw.finish()
    };

    let data_len: u32 = data_len_u64
        .try_into()
        .map_err(|_| anyhow::anyhow!("Snapshot too large (>{} bytes)", u32::MAX))?;

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header(STATE_COMMITTED, data_len, checksum))?;
    file.sync_all()?;

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(HEADER_SIZE + data_len as usize)
}

/// 简单校验和（非加密，仅用于完整性检测）
fn simple_checksum(data: &[u8]) -> u32 {
    let mut c = SimpleChecksum::new();
    c.update(data);
    c.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BatchOp, KvStore};

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("hist-index-snap-{}-{}", tag, nanos))
    }

    #[test]
    fn checksum_is_independent_of_chunking() {
        let data: Vec<u8> = (0u8..=200).collect();
        let whole = simple_checksum(&data);

        let mut c = SimpleChecksum::new();
        for piece in data.chunks(3) {
            c.update(piece);
        }
        assert_eq!(c.finalize(), whole);
    }

    #[tokio::test]
    async fn snapshot_round_trips_store_contents() {
        let dir = unique_tmp_dir("roundtrip");
        let snap = SnapshotStore::new(dir.join("index.db"));

        let store = MemoryStore::new();
        store
            .batch(vec![
                BatchOp::Put {
                    key: "page/a".into(),
                    value: br#"{"id":"a"}"#.to_vec(),
                },
                BatchOp::Put {
                    key: "visit/0000000000001".into(),
                    value: br#""a""#.to_vec(),
                },
            ])
            .await
            .unwrap();

        snap.write_atomic(&store).await.unwrap();
        let loaded = snap.load_if_valid().await.unwrap().unwrap();
        assert_eq!(loaded.entries(), store.entries());
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = unique_tmp_dir("missing");
        let snap = SnapshotStore::new(dir.join("index.db"));
        assert!(snap.load_if_valid().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupted_body_is_rejected() {
        let dir = unique_tmp_dir("corrupt");
        let path = dir.join("index.db");
        let snap = SnapshotStore::new(path.clone());

        let store = MemoryStore::new();
        store
            .put("page/a".into(), br#"{"id":"a"}"#.to_vec())
            .await
            .unwrap();
        snap.write_atomic(&store).await.unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(snap.load_if_valid().await.unwrap().is_none());
    }
}
