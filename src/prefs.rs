// src/prefs.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ClientError;

pub const NOTICE_LAST_SEEN: &str = "noticeLastSeen";
pub const SCHEDULE_FILTERS: &str = "courseScheduleFilters";
pub const ATTENDANCE_UPDATE_CHECK: &str = "attendance_update_check";
pub const ATTENDANCE_UPDATE_EVENT: &str = "attendance_update_event";

/// 本地偏好存储：一个 JSON 对象文件，同一个键后写覆盖先写。
/// 克隆共享同一把锁，读-改-写期间不会丢掉其他键
#[derive(Debug, Clone)]
pub struct PrefStore {
    backend: Backend,
}

#[derive(Debug, Clone)]
enum Backend {
    File {
        path: PathBuf,
        lock: Arc<Mutex<()>>,
    },
    Memory(Arc<Mutex<Map<String, Value>>>),
}

impl PrefStore {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::File {
                path: path.into(),
                lock: Arc::new(Mutex::new(())),
            },
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(Mutex::new(Map::new()))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::File { path, .. } => Some(path),
            Backend::Memory(_) => None,
        }
    }

    async fn load(&self) -> Result<Map<String, Value>, ClientError> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.lock().await.clone()),
            Backend::File { path, .. } => read_file(path).await,
        }
    }

    /// 在锁内完成一次读-改-写
    pub async fn update<R, F>(&self, f: F) -> Result<R, ClientError>
    where
        F: FnOnce(&mut Map<String, Value>) -> Result<R, ClientError>,
    {
        match &self.backend {
            Backend::Memory(map) => {
                let mut guard = map.lock().await;
                let mut next = guard.clone();
                let out = f(&mut next)?;
                *guard = next;
                Ok(out)
            }
            Backend::File { path, lock } => {
                let _guard = lock.lock().await;
                let mut map = read_file(path).await?;
                let out = f(&mut map)?;
                write_file(path, map).await?;
                Ok(out)
            }
        }
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<Value>, ClientError> {
        Ok(self.load().await?.remove(key))
    }

    /// 读取并解析；解析失败视为没有 (值仅供参考)
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ClientError> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!("偏好 {} 无法解析: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), ClientError> {
        let value = serde_json::to_value(value)?;
        self.update(|map| {
            map.insert(key.to_owned(), value);
            Ok(())
        })
        .await
    }

    pub async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.update(|map| {
            map.remove(key);
            Ok(())
        })
        .await
    }

    /// 上次查看公告的时间 (毫秒)，没有时为 0
    pub async fn notice_last_seen(&self) -> i64 {
        self.get::<i64>(NOTICE_LAST_SEEN).await.ok().flatten().unwrap_or(0)
    }

    pub async fn mark_notices_seen(&self, at_ms: i64) -> Result<(), ClientError> {
        self.set(NOTICE_LAST_SEEN, &at_ms).await
    }
}

async fn read_file(path: &Path) -> Result<Map<String, Value>, ClientError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!("偏好文件 {} 已损坏，按空处理", path.display());
                Ok(Map::new())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

/// 先写同目录下的临时文件再改名，读方不会看到写了一半的文件
async fn write_file(path: &Path, map: Map<String, Value>) -> Result<(), ClientError> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
    if let Some(dir) = dir {
        tokio::fs::create_dir_all(dir).await?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "prefs".into());
    let tmp_name = format!(".{}.{}.tmp", name, Uuid::new_v4().simple());
    let tmp = match dir {
        Some(dir) => dir.join(tmp_name),
        None => PathBuf::from(tmp_name),
    };
    let body = serde_json::to_vec_pretty(&Value::Object(map))?;
    tokio::fs::write(&tmp, body).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_last_write_wins() {
        let store = PrefStore::memory();
        store.set("k", &1).await.unwrap();
        store.set("k", &2).await.unwrap();
        assert_eq!(store.get::<i64>("k").await.unwrap(), Some(2));
        store.remove("k").await.unwrap();
        assert_eq!(store.get::<i64>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_type_reads_as_missing() {
        let store = PrefStore::memory();
        store.set(NOTICE_LAST_SEEN, "yesterday").await.unwrap();
        assert_eq!(store.notice_last_seen().await, 0);
    }

    async fn concurrent_writes(store: PrefStore) {
        for round in 0..20 {
            let mut tasks = tokio::task::JoinSet::new();
            for k in 0..8 {
                let store = store.clone();
                tasks.spawn(async move { store.set(&format!("k{}_{}", round, k), &k).await });
            }
            while let Some(done) = tasks.join_next().await {
                done.expect("task").expect("write");
            }
        }
        for round in 0..20 {
            for k in 0..8 {
                let key = format!("k{}_{}", round, k);
                assert_eq!(store.get::<i64>(&key).await.unwrap(), Some(k), "{}", key);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_file_writes_keep_every_key() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = PrefStore::file(dir.path().join("nested").join("prefs.json"));
        concurrent_writes(store.clone()).await;

        // 临时文件都已改名，目录里只剩偏好文件
        let mut entries = std::fs::read_dir(dir.path().join("nested")).expect("dir");
        let only = entries.next().expect("one file").expect("entry");
        assert_eq!(only.file_name(), "prefs.json");
        assert!(entries.next().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_memory_writes_keep_every_key() {
        concurrent_writes(PrefStore::memory()).await;
    }

    #[tokio::test]
    async fn update_failure_leaves_file_untouched() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = PrefStore::file(dir.path().join("prefs.json"));
        store.set(NOTICE_LAST_SEEN, &5).await.unwrap();
        let err = store
            .update(|map| {
                map.clear();
                Err::<(), _>(ClientError::Invalid("中止".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "中止");
        assert_eq!(store.notice_last_seen().await, 5);
    }
}
