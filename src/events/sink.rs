use crate::{
    constants::ICON_PLACEHOLDER,
    events::model::{LogEvent, LogLevel},
};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn handle(&self, event: &LogEvent);
    async fn flush(&self) {}
}

pub struct ConsoleSink {
    level_filter: Option<LogLevel>,
}

impl ConsoleSink {
    pub fn new(level_filter: Option<LogLevel>) -> Self {
        Self { level_filter }
    }

    fn accepts(&self, event: &LogEvent) -> bool {
        let meta = event.meta();
        if meta.suppress_console {
            return false;
        }
        match self.level_filter {
            Some(min) => meta.level.rank() >= min.rank(),
            None => true,
        }
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    async fn handle(&self, event: &LogEvent) {
        if !self.accepts(event) {
            return;
        }
        match event {
            LogEvent::Dial(d) => println!(
                "{}DIAL addr={} state={} detail={:?} corr={:?}",
                ICON_PLACEHOLDER, d.address, d.state, d.detail, d.meta.corr_id
            ),
            LogEvent::Certificate(c) => println!(
                "{}CERT addr={} action={} fp={:?} detail={:?}",
                ICON_PLACEHOLDER, c.address, c.action, c.fingerprint, c.detail
            ),
            LogEvent::Handshake(h) => println!(
                "{}HANDSHAKE dir={:?} addr={} status={} session={:?} pubkey={:?}",
                ICON_PLACEHOLDER, h.direction, h.address, h.status, h.session_id, h.public_key
            ),
            LogEvent::Call(c) => println!(
                "{}CALL method={} attempt={} outcome={} detail={:?}",
                ICON_PLACEHOLDER, c.method, c.attempt, c.outcome, c.detail
            ),
            LogEvent::System(s) => println!(
                "{}SYS action={} detail={:?} corr={:?}",
                ICON_PLACEHOLDER, s.action, s.detail, s.meta.corr_id
            ),
        }
    }
}

/// JSON lines sink with size based rotation (`file.jsonl.1`, `.2`, ...).
pub struct JsonFileSink {
    path: PathBuf,
    rotate: bool,
    max_size_bytes: u64,
    max_backups: u32,
    writer: tokio::sync::Mutex<Option<tokio::fs::File>>,
}

impl JsonFileSink {
    pub async fn new<P: Into<PathBuf>>(
        path: P,
        rotate: bool,
        max_size_bytes: u64,
        max_backups: u32,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let file = Self::open_append(&path).await?;
        Ok(Self {
            path,
            rotate,
            max_size_bytes,
            max_backups,
            writer: tokio::sync::Mutex::new(Some(file)),
        })
    }

    async fn open_append(path: &PathBuf) -> std::io::Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
    }

    fn backup_path(&self, idx: u32) -> PathBuf {
        self.path.with_extension(format!("jsonl.{}", idx))
    }

    async fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.rotate {
            return Ok(());
        }
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if len < self.max_size_bytes {
            return Ok(());
        }
        let mut guard = self.writer.lock().await;
        *guard = None;
        for idx in (1..self.max_backups).rev() {
            let from = self.backup_path(idx);
            if tokio::fs::metadata(&from).await.is_ok() {
                tokio::fs::rename(&from, self.backup_path(idx + 1)).await?;
            }
        }
        if self.max_backups > 0 {
            tokio::fs::rename(&self.path, self.backup_path(1)).await?;
        } else {
            tokio::fs::remove_file(&self.path).await?;
        }
        *guard = Some(Self::open_append(&self.path).await?);
        Ok(())
    }
}

#[async_trait]
impl LogSink for JsonFileSink {
    async fn handle(&self, event: &LogEvent) {
        let _ = self.rotate_if_needed().await;
        let Ok(mut line) = serde_json::to_string(event) else {
            return;
        };
        line.push('\n');
        let mut guard = self.writer.lock().await;
        if let Some(f) = guard.as_mut() {
            let _ = f.write_all(line.as_bytes()).await;
        }
    }

    async fn flush(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(f) = guard.as_mut() {
            let _ = f.flush().await;
            let _ = f.sync_all().await;
        }
    }
}
