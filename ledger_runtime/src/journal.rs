//! Append-only journal of transaction change notifications.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only, no rewriting
//!   - fsync after every append
//!   - Sequence strictly increasing, checked on append and on read
//!   - Frames with an unknown schema version are rejected

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;

use ledger_kernel::events::{ChangeNotification, SCHEMA_VERSION};

use crate::error::JournalError;
use crate::proto_bridge::{kernel_to_proto, proto_to_kernel};
use crate::proto_types::ProtoChangeEnvelope;

const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub struct Journal {
    path: PathBuf,
    last_sequence: u64,
}

impl Journal {
    /// Open or create a journal. Existing frames are read to find the
    /// last sequence number.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let io_err = |source: io::Error| JournalError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let last_sequence = if path.exists() {
            read_journal(path)?.last().map_or(0, |n| n.sequence)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }

    /// Append one notification. Its sequence must be exactly
    /// `next_sequence()`.
    pub fn append(&mut self, notification: &ChangeNotification) -> Result<(), JournalError> {
        let expected = self.next_sequence();
        if notification.sequence != expected {
            return Err(JournalError::Sequence {
                expected,
                actual: notification.sequence,
            });
        }

        let buf = kernel_to_proto(notification).encode_to_vec();
        self.write_frame(&buf).map_err(|source| JournalError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.last_sequence = notification.sequence;
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<ChangeNotification>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_journal(&self.path)
    }

    fn write_frame(&self, buf: &[u8]) -> io::Result<()> {
        let len = u32::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds 4 GiB"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(buf)?;
            writer.flush()?;
        }
        file.sync_all()
    }
}

/// Read and validate every frame of a journal file.
pub fn read_journal(path: &Path) -> Result<Vec<ChangeNotification>, JournalError> {
    let io_err = |source: io::Error| JournalError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let mut notifications: Vec<ChangeNotification> = Vec::new();
    let mut len_buf = [0u8; 4];
    let mut offset: u64 = 0;

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(io_err(e)),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(JournalError::FrameLength { len, offset });
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .map_err(|_| JournalError::Truncated { offset })?;

        let proto = ProtoChangeEnvelope::decode(frame.as_slice())
            .map_err(|source| JournalError::Decode { offset, source })?;
        if proto.schema_version != SCHEMA_VERSION {
            return Err(JournalError::InvalidFrame {
                sequence: proto.sequence,
                reason: format!("schema version {} is not {SCHEMA_VERSION}", proto.schema_version),
            });
        }
        let notification = proto_to_kernel(&proto)?;

        let previous = notifications.last().map_or(0, |n| n.sequence);
        if notification.sequence <= previous {
            return Err(JournalError::Sequence {
                expected: previous + 1,
                actual: notification.sequence,
            });
        }
        notifications.push(notification);
        offset += 4 + len as u64;
    }

    Ok(notifications)
}
