//! Append-Only File
//!
//! Mutations are written one JSON object per line:
//!
//! ```text
//! {"op":"set","key":"name","value":"Ariz"}
//! {"op":"expire","key":"name","expires_at":1700000060}
//! {"op":"del","key":"name"}
//! ```
//!
//! ## Write path
//!
//! ```text
//! KeyValueStore ──try_send──> bounded queue ──> writer task ──> file
//!   (write lock held)          (never blocks)    (batches, flushes)
//! ```
//!
//! The store never waits on disk. If the queue is full (the disk is slow or
//! the sink is stuck) the record is dropped and counted, the in-memory
//! mutation stands.

use crate::error::{Error, Result};
use crate::persistence::{Mutation, Persistence};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default number of records buffered between the store and the writer task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Maximum records written between two flushes.
const MAX_BATCH: usize = 256;

/// Handle to the background AOF writer.
pub struct AofWriter {
    sender: mpsc::Sender<Mutation>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl std::fmt::Debug for AofWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AofWriter")
            .field("queued", &(self.sender.max_capacity() - self.sender.capacity()))
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl AofWriter {
    /// Opens (or creates) the file at `path` for appending and starts the
    /// writer task.
    ///
    /// A torn final line left by a crash is repaired first, so new records
    /// always start on a line of their own.
    pub async fn open<P: AsRef<Path>>(path: P, queue_capacity: usize) -> Result<Self> {
        repair_tail(path.as_ref()).await?;
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        info!(path = %path.as_ref().display(), "Append-only file opened");
        Self::spawn(file, queue_capacity)
    }

    /// Starts a writer task that appends records to `sink`.
    pub fn spawn<W>(sink: W, queue_capacity: usize) -> Result<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let shutdown = CancellationToken::new();

        let task = runtime.spawn(writer_loop(
            BufWriter::new(sink),
            receiver,
            shutdown.clone(),
        ));

        Ok(Self {
            sender,
            shutdown,
            task: Mutex::new(Some(task)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Number of records discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Writes everything still queued, flushes, and stops the writer task.
    ///
    /// Records submitted after this call are dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "AOF writer task failed");
            }
        }
    }
}

impl Persistence for AofWriter {
    fn record(&self, mutation: &Mutation) {
        let reason = match self.sender.try_send(mutation.clone()) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "queue full",
            Err(TrySendError::Closed(_)) => "writer stopped",
        };
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            key = %mutation.key(),
            reason,
            dropped,
            "AOF record dropped"
        );
    }
}

/// Makes sure a non-empty file ends in `\n`.
///
/// An unterminated last line that still decodes (only the newline was lost)
/// gets its terminator. Anything else is a partial record, which [`replay`]
/// skipped, and is cut off.
async fn repair_tail(path: &Path) -> Result<()> {
    let mut file = match tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::End(-1)).await?;
    if file.read_u8().await? == b'\n' {
        return Ok(());
    }

    let contents = tokio::fs::read(path).await?;
    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);

    if serde_json::from_slice::<Mutation>(&contents[keep..]).is_ok() {
        file.seek(SeekFrom::End(0)).await?;
        file.write_all(b"\n").await?;
        debug!(path = %path.display(), "Terminated last AOF record");
    } else {
        file.set_len(keep as u64).await?;
        warn!(
            path = %path.display(),
            discarded = len - keep as u64,
            "Truncated torn AOF record"
        );
    }
    file.sync_all().await?;
    Ok(())
}

async fn writer_loop<W>(
    mut writer: BufWriter<W>,
    mut receiver: mpsc::Receiver<Mutation>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => match received {
                Some(mutation) => mutation,
                None => break,
            },
        };

        let mut written = 1;
        let mut result = write_record(&mut writer, &first).await;
        while result.is_ok() && written < MAX_BATCH {
            match receiver.try_recv() {
                Ok(mutation) => {
                    result = write_record(&mut writer, &mutation).await;
                    written += 1;
                }
                Err(_) => break,
            }
        }
        if result.is_ok() {
            result = writer.flush().await.map_err(Error::from);
        }
        if let Err(e) = result {
            // The file may now end in a partial line; appending after it
            // would corrupt the record that follows.
            receiver.close();
            let mut discarded = 0usize;
            while receiver.try_recv().is_ok() {
                discarded += 1;
            }
            error!(error = %e, discarded, "Failed to append to AOF, writer stopped");
            return;
        }
    }

    // Drain whatever was accepted before shutdown
    receiver.close();
    let mut drained = 0usize;
    while let Ok(mutation) = receiver.try_recv() {
        if let Err(e) = write_record(&mut writer, &mutation).await {
            error!(error = %e, "Failed to append to AOF during shutdown");
            break;
        }
        drained += 1;
    }
    if let Err(e) = writer.flush().await {
        error!(error = %e, "Failed to flush AOF during shutdown");
    }
    debug!(drained, "AOF writer stopped");
}

async fn write_record<W>(writer: &mut BufWriter<W>, mutation: &Mutation) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(mutation)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

/// Reads the AOF at `path` and feeds every record to `apply`, in order.
///
/// A missing file replays nothing. A final line without a trailing newline
/// that fails to decode is treated as a torn write and skipped; any other
/// undecodable line is an [`Error::Corrupt`].
///
/// Returns the number of records applied.
pub fn replay<P, F>(path: P, mut apply: F) -> Result<usize>
where
    P: AsRef<Path>,
    F: FnMut(Mutation),
{
    let contents = match std::fs::read_to_string(path.as_ref()) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = contents.split('\n').collect();
    let last = lines.len() - 1;
    let mut applied = 0;

    for (index, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Mutation>(line) {
            Ok(mutation) => {
                apply(mutation);
                applied += 1;
            }
            Err(e) if index == last => {
                warn!(line = index + 1, error = %e, "Skipping torn AOF record");
            }
            Err(source) => {
                return Err(Error::Corrupt {
                    line: index + 1,
                    source,
                })
            }
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// A sink whose every write fails, like a disk that went away.
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::other("device removed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn set(key: &str, value: &str) -> Mutation {
        Mutation::Set {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_and_replay() {
        let temp_file = NamedTempFile::new().unwrap();
        let writer = AofWriter::open(temp_file.path(), 16).await.unwrap();

        let records = vec![
            set("key1", "value1"),
            Mutation::Expire {
                key: "key1".to_string(),
                expires_at: 42,
            },
            Mutation::Persist {
                key: "key1".to_string(),
            },
            Mutation::Del {
                key: "key1".to_string(),
            },
        ];
        for record in &records {
            writer.record(record);
        }
        writer.shutdown().await;

        let mut replayed = Vec::new();
        let applied = replay(temp_file.path(), |m| replayed.push(m)).unwrap();
        assert_eq!(applied, 4);
        assert_eq!(replayed, records);
        assert_eq!(writer.dropped(), 0);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let temp_file = NamedTempFile::new().unwrap();

        let writer = AofWriter::open(temp_file.path(), 16).await.unwrap();
        writer.record(&set("a", "1"));
        writer.shutdown().await;

        let writer = AofWriter::open(temp_file.path(), 16).await.unwrap();
        writer.record(&set("b", "2"));
        writer.shutdown().await;

        let mut replayed = Vec::new();
        replay(temp_file.path(), |m| replayed.push(m)).unwrap();
        assert_eq!(replayed, vec![set("a", "1"), set("b", "2")]);
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_dropped() {
        let temp_file = NamedTempFile::new().unwrap();
        let writer = AofWriter::open(temp_file.path(), 16).await.unwrap();
        writer.shutdown().await;

        writer.record(&set("late", "v"));
        assert_eq!(writer.dropped(), 1);
    }

    #[tokio::test]
    async fn test_stalled_sink_never_blocks_record() {
        // Nobody reads the other end, so the writer task stalls once the
        // duplex buffer fills up.
        let (sink, _reader) = tokio::io::duplex(8);
        let writer = AofWriter::spawn(sink, 4).unwrap();

        let started = std::time::Instant::now();
        for i in 0..1_000 {
            writer.record(&set(&format!("key{}", i), "value"));
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(writer.dropped() > 0);
    }

    #[test]
    fn test_replay_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let applied = replay(dir.path().join("missing.aof"), |_| {}).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_replay_skips_torn_tail() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            "{{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}}\n\n{{\"op\":\"se"
        )
        .unwrap();

        let mut replayed = Vec::new();
        let applied = replay(temp_file.path(), |m| replayed.push(m)).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(replayed, vec![set("a", "1")]);
    }

    #[test]
    fn test_replay_rejects_corrupt_line() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            "garbage\n{{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}}\n"
        )
        .unwrap();

        let err = replay(temp_file.path(), |_| {}).unwrap_err();
        assert!(matches!(err, Error::Corrupt { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_reopen_after_torn_tail() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            "{{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}}\n{{\"op\":\"se"
        )
        .unwrap();

        // First restart: the torn record is skipped
        assert_eq!(replay(temp_file.path(), |_| {}).unwrap(), 1);

        let writer = AofWriter::open(temp_file.path(), 16).await.unwrap();
        writer.record(&set("b", "2"));
        writer.shutdown().await;

        // Second restart sees both records and nothing corrupt
        let mut replayed = Vec::new();
        replay(temp_file.path(), |m| replayed.push(m)).unwrap();
        assert_eq!(replayed, vec![set("a", "1"), set("b", "2")]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_unterminated_complete_record() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}}").unwrap();

        let writer = AofWriter::open(temp_file.path(), 16).await.unwrap();
        writer.record(&set("b", "2"));
        writer.shutdown().await;

        let mut replayed = Vec::new();
        replay(temp_file.path(), |m| replayed.push(m)).unwrap();
        assert_eq!(replayed, vec![set("a", "1"), set("b", "2")]);
    }

    #[tokio::test]
    async fn test_failed_write_stops_writer() {
        let writer = AofWriter::spawn(BrokenSink, 16).unwrap();
        writer.record(&set("a", "1"));

        // Once the writer has given up, new records are refused
        let mut refused = false;
        for i in 0..200 {
            writer.record(&set(&format!("k{}", i), "v"));
            if writer.dropped() > 0 {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(refused);

        tokio::time::timeout(Duration::from_secs(2), writer.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_completes_under_steady_writes() {
        let temp_file = NamedTempFile::new().unwrap();
        let writer = Arc::new(AofWriter::open(temp_file.path(), 16).await.unwrap());

        let producer = {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                let mut i = 0u64;
                loop {
                    writer.record(&set(&format!("k{}", i), "v"));
                    i += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(2), writer.shutdown())
            .await
            .unwrap();
        producer.abort();

        let applied = replay(temp_file.path(), |_| {}).unwrap();
        assert!(applied > 0);
    }
}
