use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability;

/// Largest payload a record may carry. Replay treats a bigger length prefix as a torn tail.
pub const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Frame one record as `[len][bincode][crc32]`.
fn encode_frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_RECORD_LEN as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("ledger record of {} bytes exceeds limit", payload.len()),
        ));
    }
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(frame)
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn end of file.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only ledger log.
///
/// Entry format: `[u32 LE: len][bincode: Event][u32 LE: crc32 of payload]`.
/// A torn or corrupt tail (crash mid-write) is dropped on replay. A batch that
/// fails to write is truncated away, so the file only ever holds whole,
/// acknowledged batches.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// Set when a failed batch could not be truncated away.
    broken: bool,
    #[cfg(test)]
    fail_after_frames: Option<usize>,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            broken: false,
            #[cfg(test)]
            fail_after_frames: None,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.write_frames(&[encode_frame(event)?])
    }

    /// Write and fsync a batch of frames. All or nothing: on any error the
    /// file is cut back to its length before the batch.
    pub fn write_frames(&mut self, frames: &[Vec<u8>]) -> io::Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        if self.broken {
            return Err(io::Error::other("ledger log needs compaction after a failed rollback"));
        }
        let committed_len = self.writer.get_ref().metadata()?.len();
        match self.try_write_frames(frames) {
            Ok(()) => {
                self.appends_since_compact += frames.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.truncate_to(committed_len) {
                    tracing::error!(path = %self.path.display(), "ledger rollback failed: {rollback}");
                    self.broken = true;
                }
                Err(e)
            }
        }
    }

    fn try_write_frames(&mut self, frames: &[Vec<u8>]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_after_frames {
            for frame in frames.iter().take(n) {
                self.writer.write_all(frame)?;
            }
            self.writer.flush()?;
            return Err(io::Error::other("injected write failure"));
        }
        for frame in frames {
            self.writer.write_all(frame)?;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    /// Drop whatever is still buffered and cut the file back to `len`.
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (_, _unwritten) = stale.into_parts();
        let file = self.writer.get_ref();
        file.set_len(len)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Rewrite the log as `snapshot` via a temp file and an atomic rename.
    pub fn compact(&mut self, snapshot: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in snapshot {
                writer.write_all(&encode_frame(event)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.broken = false;
        Ok(())
    }

    /// Read every intact record from disk. A missing file is an empty ledger.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf);
            if len > MAX_RECORD_LEN {
                tracing::warn!(path = %path.display(), len, "oversized ledger record, truncating replay");
                break;
            }
            let mut payload = vec![0u8; len as usize];
            if !read_frame_part(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!(path = %path.display(), "corrupt ledger record, truncating replay");
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }

        Ok(events)
    }
}

// ── Group-commit writer ──────────────────────────────────

type Ack = oneshot::Sender<io::Result<()>>;

enum WalCommand {
    Append { event: Event, ack: Ack },
    Compact { snapshot: Vec<Event>, ack: Ack },
    AppendsSinceCompact { reply: oneshot::Sender<u64> },
}

/// Cloneable handle to the task that owns the `Wal`.
#[derive(Clone)]
pub struct WalWriter {
    tx: mpsc::Sender<WalCommand>,
    #[cfg(test)]
    rejected_pool: std::sync::Arc<std::sync::Mutex<Option<crate::model::PoolKey>>>,
}

impl WalWriter {
    /// Move `wal` into a background task. Must be called inside a tokio runtime.
    pub fn spawn(wal: Wal) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(wal, rx));
        Self {
            tx,
            #[cfg(test)]
            rejected_pool: Default::default(),
        }
    }

    /// Durably append one record. Returns once the batch holding it is fsynced.
    pub async fn append(&self, event: Event) -> io::Result<()> {
        #[cfg(test)]
        if *self.rejected_pool.lock().unwrap() == Some(event.pool()) {
            return Err(io::Error::other("injected append failure"));
        }
        let (ack, done) = oneshot::channel();
        self.send(WalCommand::Append { event, ack }).await?;
        done.await.map_err(|_| writer_gone())?
    }

    /// Fail every append for `pool` until cleared with `None`.
    #[cfg(test)]
    pub(crate) fn reject_pool(&self, pool: Option<crate::model::PoolKey>) {
        *self.rejected_pool.lock().unwrap() = pool;
    }

    pub async fn compact(&self, snapshot: Vec<Event>) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(WalCommand::Compact { snapshot, ack }).await?;
        done.await.map_err(|_| writer_gone())?
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (reply, rx) = oneshot::channel();
        if self
            .send(WalCommand::AppendsSinceCompact { reply })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    async fn send(&self, cmd: WalCommand) -> io::Result<()> {
        self.tx.send(cmd).await.map_err(|_| writer_gone())
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "ledger writer shut down")
}

/// Block for the first append, drain whatever else is already queued,
/// then fsync once for the whole batch.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut batch: Vec<(Event, Ack)> = Vec::new();
    while let Some(cmd) = rx.recv().await {
        let mut pending = Some(cmd);
        while let Some(cmd) = pending.take() {
            match cmd {
                WalCommand::Append { event, ack } => {
                    batch.push((event, ack));
                    if let Ok(next) = rx.try_recv() {
                        pending = Some(next);
                    }
                }
                other => {
                    commit_batch(&mut wal, &mut batch);
                    handle_control(&mut wal, other);
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
    }
}

/// A record that cannot be encoded fails alone; the rest of the batch is
/// written together and acknowledged with the batch outcome.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, Ack)>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let mut frames = Vec::with_capacity(batch.len());
    let mut acks = Vec::with_capacity(batch.len());
    for (event, ack) in batch.drain(..) {
        match encode_frame(&event) {
            Ok(frame) => {
                frames.push(frame);
                acks.push(ack);
            }
            Err(e) => {
                let _ = ack.send(Err(e));
            }
        }
    }
    let result = wal.write_frames(&frames);

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for ack in acks {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = ack.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, ack } => {
            let _ = ack.send(wal.compact(&snapshot));
        }
        WalCommand::AppendsSinceCompact { reply } => {
            let _ = reply.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}
