//! "上次成功的 key" 单槽存储。
//!
//! 生成成功时写入；同一个 key 后来被判定为额度耗尽时清空；其他情况不动。

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

pub trait PreferenceStore: Send + Sync {
    fn get(&self) -> Option<String>;

    fn set(&self, credential: &str);

    fn clear(&self);

    /// 仅当当前偏好正是 `credential` 时清空，返回是否清空。
    fn clear_if(&self, credential: &str) -> bool {
        if self.get().as_deref() == Some(credential) {
            self.clear();
            return true;
        }
        false
    }
}

/// 进程内存储：无锁读取。
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    slot: ArcSwapOption<String>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(credential: &str) -> Self {
        let store = Self::new();
        store.set(credential);
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self) -> Option<String> {
        self.slot.load_full().map(|s| s.as_ref().clone())
    }

    fn set(&self, credential: &str) {
        self.slot.store(Some(Arc::new(credential.to_string())));
    }

    fn clear(&self) {
        self.slot.store(None);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreferenceFile {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    sticky_key: Option<String>,
}

/// 落盘存储：内存槽 + `preference.json`，服务重启后仍然记得上次成功的 key。
///
/// 读写走内存槽；写盘交给后台任务，只落最新值，先写临时文件再 rename。
/// 写盘失败只记日志，不影响本次生成结果。
#[derive(Debug)]
pub struct FilePreferenceStore {
    memory: MemoryPreferenceStore,
    /// (版本号, 待写入的值)
    pending: watch::Sender<(u64, Option<String>)>,
    written: watch::Receiver<u64>,
}

impl FilePreferenceStore {
    /// 必须在 tokio 运行时内调用。
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let memory = MemoryPreferenceStore::new();
        match read_file(&path).await {
            Ok(Some(key)) => memory.set(&key),
            Ok(None) => {}
            Err(e) => tracing::warn!("读取偏好文件 {} 失败: {e:#}", path.display()),
        }

        let (pending, pending_rx) = watch::channel((0, memory.get()));
        let (written_tx, written) = watch::channel(0);
        tokio::spawn(write_loop(path, pending_rx, written_tx));

        Self {
            memory,
            pending,
            written,
        }
    }

    fn persist(&self, value: Option<String>) {
        self.pending.send_modify(|(version, slot)| {
            *version += 1;
            *slot = value;
        });
    }

    /// 等到目前为止的修改都已落盘（或写盘任务已退出）。
    pub async fn persisted(&self) {
        let target = self.pending.borrow().0;
        let mut written = self.written.clone();
        let _ = written.wait_for(|v| *v >= target).await;
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self) -> Option<String> {
        self.memory.get()
    }

    fn set(&self, credential: &str) {
        self.memory.set(credential);
        self.persist(Some(credential.to_string()));
    }

    fn clear(&self) {
        self.memory.clear();
        self.persist(None);
    }
}

async fn write_loop(
    path: PathBuf,
    mut pending: watch::Receiver<(u64, Option<String>)>,
    written: watch::Sender<u64>,
) {
    while pending.changed().await.is_ok() {
        let (version, value) = pending.borrow_and_update().clone();
        if let Err(e) = write_file(&path, value).await {
            tracing::warn!("写入偏好文件 {} 失败: {e:#}", path.display());
        }
        written.send_replace(version);
    }
}

async fn read_file(path: &Path) -> anyhow::Result<Option<String>> {
    let data = match tokio::fs::read(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let file: PreferenceFile = sonic_rs::from_slice(&data)?;
    Ok(file
        .sticky_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_file(path: &Path, sticky_key: Option<String>) -> anyhow::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir).await?;
    }
    let data = sonic_rs::to_vec_pretty(&PreferenceFile { sticky_key })?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
