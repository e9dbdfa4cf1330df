use crate::assembler::DEFAULT_MAX_BUFFER;
use crate::source::LineSource;
use loratail_core::IngestionError;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File as TokioFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Follows a single growing file with tail -f behavior
///
/// Reading starts at the end of the file as it was when opened. Appended
/// content is picked up on filesystem notifications, and on a fixed poll
/// interval in case a notification is missed. Only newline-terminated lines
/// are yielded; a trailing partial line waits for its newline unless it grows
/// past the line cap, in which case it is yielded as is.
pub struct FileTail {
    path: PathBuf,
    /// Byte offset of the next unread byte
    position: u64,
    /// Bytes of a line whose newline has not arrived yet
    pending: Vec<u8>,
    max_line: usize,
    ready: VecDeque<String>,
    events: mpsc::Receiver<notify::Result<Event>>,
    poll_interval: Duration,
    finished: bool,
    _watcher: RecommendedWatcher,
}

impl FileTail {
    /// Start following `path` from its current end
    ///
    /// Fails if the file does not exist or cannot be watched.
    pub async fn open(path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self, IngestionError> {
        let path = path.as_ref().to_path_buf();

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            IngestionError::Source(format!("Failed to tail file {:?}: {}", path, e))
        })?;
        if !metadata.is_file() {
            return Err(IngestionError::Source(format!(
                "Failed to tail file {:?}: not a regular file",
                path
            )));
        }

        // Bridge sync notify callbacks into the async side
        let (async_tx, async_rx) = mpsc::channel::<notify::Result<Event>>(100);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = async_tx.blocking_send(res);
            },
            Config::default(),
        )
        .map_err(|e| IngestionError::Source(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                IngestionError::Source(format!("Failed to watch file {:?}: {}", path, e))
            })?;

        info!(path = %path.display(), position = metadata.len(), "Tailing file");

        Ok(Self {
            path,
            position: metadata.len(),
            pending: Vec::new(),
            max_line: DEFAULT_MAX_BUFFER,
            ready: VecDeque::new(),
            events: async_rx,
            poll_interval,
            finished: false,
            _watcher: watcher,
        })
    }

    /// Longest partial line held while waiting for a newline
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current read offset in bytes
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read everything appended since the last read
    async fn read_available(&mut self) -> Result<(), IngestionError> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            IngestionError::Source(format!("Failed to stat {:?}: {}", self.path, e))
        })?;

        if metadata.len() < self.position {
            warn!(path = %self.path.display(), "File truncated, reading from start");
            self.position = 0;
            self.pending.clear();
        }
        if metadata.len() == self.position {
            return Ok(());
        }

        let file = TokioFile::open(&self.path).await.map_err(|e| {
            IngestionError::Source(format!("Failed to open file {:?}: {}", self.path, e))
        })?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.position))
            .await
            .map_err(|e| {
                IngestionError::Source(format!("Failed to seek in file {:?}: {}", self.path, e))
            })?;

        let mut lines_read = 0;
        loop {
            // pending never exceeds max_line here, so room is at least one byte
            let room = (self.max_line + 1 - self.pending.len()) as u64;
            let bytes_read = (&mut reader)
                .take(room)
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(|e| {
                    IngestionError::Source(format!("Failed to read from file {:?}: {}", self.path, e))
                })?;
            if bytes_read == 0 {
                break;
            }
            self.position += bytes_read as u64;

            if self.pending.last() == Some(&b'\n') {
                let mut line = std::mem::take(&mut self.pending);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.ready.push_back(String::from_utf8_lossy(&line).into_owned());
                lines_read += 1;
            } else if self.pending.len() > self.max_line {
                warn!(
                    path = %self.path.display(),
                    size = self.pending.len(),
                    limit = self.max_line,
                    "Line exceeds cap without newline, passing it on"
                );
                let line = std::mem::take(&mut self.pending);
                self.ready.push_back(String::from_utf8_lossy(&line).into_owned());
                lines_read += 1;
            }
        }

        if lines_read > 0 {
            debug!(path = %self.path.display(), lines = lines_read, "Read lines from file");
        }
        Ok(())
    }

    fn fail(&mut self, error: IngestionError) -> Option<Result<String, IngestionError>> {
        warn!(path = %self.path.display(), error = %error, "Line source failed");
        self.finished = true;
        self.ready.clear();
        Some(Err(error))
    }
}

impl LineSource for FileTail {
    async fn next_line(&mut self) -> Option<Result<String, IngestionError>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }
            if self.finished {
                return None;
            }

            match tokio::time::timeout(self.poll_interval, self.events.recv()).await {
                Ok(Some(Ok(event))) => {
                    debug!(kind = ?event.kind, "Received file event");
                }
                Ok(Some(Err(e))) => {
                    return self.fail(IngestionError::Source(format!("File watch error: {}", e)));
                }
                Ok(None) => {
                    return self.fail(IngestionError::Source("File watcher stopped".to_string()));
                }
                Err(_) => {
                    // Poll tick, re-check the file below
                }
            }

            if let Err(e) = self.read_available().await {
                return self.fail(e);
            }
        }
    }
}
