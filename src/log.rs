use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
};

use anyhow::{anyhow, Result};
use tracing::{debug, error, warn};

use crate::{
    common::{SpaceID, INITIAL_LSN, LSN},
    tuple::Tuple,
};

const LOG_BUFFER_SIZE: usize = 4096;
const RECORD_HEADER_SIZE: usize = 16;

/// Write-ahead log. Rows are buffered by `append` and become durable on
/// `flush`; a row must be flushed before its change is made visible.
pub struct LogManager {
    log_file: File,
    buffer: Vec<u8>,
    next_lsn: LSN,
}
impl LogManager {
    pub fn new(log_file_path: &str) -> Result<Self> {
        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(log_file_path)?;
        let mut log_manager = Self {
            log_file,
            buffer: vec![],
            next_lsn: INITIAL_LSN,
        };
        let (records, valid_len, file_len) = log_manager.scan()?;
        if valid_len < file_len {
            warn!(
                path = log_file_path,
                discarded = file_len - valid_len,
                "truncating torn tail of write-ahead log"
            );
            log_manager.log_file.set_len(valid_len as u64)?;
        }
        log_manager.log_file.seek(SeekFrom::End(0))?;
        log_manager.next_lsn = records
            .last()
            .map_or(INITIAL_LSN, |record| LSN(record.lsn.0 + 1));
        debug!(path = log_file_path, records = records.len(), "opened write-ahead log");
        Ok(log_manager)
    }

    pub fn next_lsn(&self) -> LSN {
        self.next_lsn
    }

    pub fn append(&mut self, body: &LogRecordBody) -> Result<LSN> {
        let lsn = self.next_lsn;
        let bytes = LogRecord::serialize(lsn, body);
        if !self.buffer.is_empty() && self.buffer.len() + bytes.len() > LOG_BUFFER_SIZE {
            self.flush()?;
        }
        self.buffer.extend_from_slice(&bytes);
        self.next_lsn.0 += 1;
        Ok(lsn)
    }

    /// Appends and flushes in one step. On error the row is neither
    /// buffered nor on disk, and its LSN is handed out again.
    pub fn write(&mut self, body: &LogRecordBody) -> Result<LSN> {
        self.flush()?;
        let file_len = self.log_file.stream_position()?;
        let lsn = self.append(body)?;
        if let Err(e) = self.flush() {
            self.buffer.clear();
            self.next_lsn = lsn;
            if let Err(rollback) = self.truncate(file_len) {
                error!(
                    lsn = lsn.0,
                    error = %rollback,
                    "could not remove rejected row from write-ahead log"
                );
            }
            return Err(e);
        }
        Ok(lsn)
    }

    pub fn read(&mut self) -> Result<Vec<LogRecord>> {
        let (records, _, _) = self.scan()?;
        self.log_file.seek(SeekFrom::End(0))?;
        Ok(records)
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.log_file.write_all(&self.buffer)?;
        self.log_file.sync_all()?;
        self.buffer.clear();
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.log_file.set_len(len)?;
        self.log_file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Reads every complete record. Returns them along with the length of
    /// the valid prefix and the file length.
    fn scan(&mut self) -> Result<(Vec<LogRecord>, usize, usize)> {
        let mut buffer = vec![];
        self.log_file.seek(SeekFrom::Start(0))?;
        self.log_file.read_to_end(&mut buffer)?;
        let mut records = vec![];
        let mut offset = 0;
        while offset < buffer.len() {
            match LogRecord::deserialize(&buffer[offset..]) {
                Ok((record, size)) => {
                    offset += size;
                    records.push(record);
                }
                Err(e) => {
                    warn!(offset, error = %e, "unreadable write-ahead log record");
                    break;
                }
            }
        }
        Ok((records, offset, buffer.len()))
    }
}

/// Durable sink for committed rows.
pub trait WalWriter: Send {
    /// Makes `body` durable under a fresh LSN. A row whose write fails is
    /// never replayed.
    fn write(&mut self, body: &LogRecordBody) -> Result<LSN>;
    fn flush(&mut self) -> Result<()>;
}

impl WalWriter for LogManager {
    fn write(&mut self, body: &LogRecordBody) -> Result<LSN> {
        LogManager::write(self, body)
    }

    fn flush(&mut self) -> Result<()> {
        LogManager::flush(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub lsn: LSN,
    pub body: LogRecordBody,
}

impl LogRecord {
    fn serialize(lsn: LSN, body: &LogRecordBody) -> Vec<u8> {
        let payload = body.serialize();
        let mut buffer = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        buffer.extend_from_slice(&lsn.0.to_be_bytes());
        buffer.extend_from_slice(&body.type_id().to_be_bytes());
        buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buffer.extend_from_slice(&payload);
        buffer
    }

    fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(anyhow!("truncated log record header"));
        }
        let lsn = LSN(u64::from_be_bytes(bytes[0..8].try_into()?));
        let type_id = u32::from_be_bytes(bytes[8..12].try_into()?);
        let size = u32::from_be_bytes(bytes[12..16].try_into()?) as usize;
        let payload = bytes
            .get(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + size)
            .ok_or_else(|| anyhow!("truncated log record payload"))?;
        let body = LogRecordBody::deserialize(type_id, payload)?;
        Ok((Self { lsn, body }, RECORD_HEADER_SIZE + size))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecordBody {
    Replace(ReplaceRow),
    Delete(DeleteRow),
    Update(UpdateRow),
}

/// Stores `tuple` under its own key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRow {
    pub space_id: SpaceID,
    pub tuple: Tuple,
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRow {
    pub space_id: SpaceID,
    pub key: Box<[u8]>,
}
/// Removes `key` and stores `tuple`, whose key may differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRow {
    pub space_id: SpaceID,
    pub key: Box<[u8]>,
    pub tuple: Tuple,
}

impl LogRecordBody {
    fn type_id(&self) -> u32 {
        match self {
            LogRecordBody::Replace(_) => 0,
            LogRecordBody::Delete(_) => 1,
            LogRecordBody::Update(_) => 2,
        }
    }

    pub fn space_id(&self) -> SpaceID {
        match self {
            LogRecordBody::Replace(row) => row.space_id,
            LogRecordBody::Delete(row) => row.space_id,
            LogRecordBody::Update(row) => row.space_id,
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&self.space_id().0.to_be_bytes());
        match self {
            LogRecordBody::Replace(row) => {
                buffer.extend_from_slice(&row.tuple.serialize());
            }
            LogRecordBody::Delete(row) => {
                write_key(&row.key, &mut buffer);
            }
            LogRecordBody::Update(row) => {
                write_key(&row.key, &mut buffer);
                buffer.extend_from_slice(&row.tuple.serialize());
            }
        }
        buffer
    }

    fn deserialize(type_id: u32, bytes: &[u8]) -> Result<Self> {
        let space_id = SpaceID(u32::from_be_bytes(
            bytes
                .get(0..4)
                .ok_or_else(|| anyhow!("truncated space id"))?
                .try_into()?,
        ));
        let rest = &bytes[4..];
        match type_id {
            0 => Ok(LogRecordBody::Replace(ReplaceRow {
                space_id,
                tuple: Tuple::deserialize(rest)?,
            })),
            1 => {
                let (key, consumed) = read_key(rest)?;
                if consumed != rest.len() {
                    return Err(anyhow!("trailing bytes in delete row"));
                }
                Ok(LogRecordBody::Delete(DeleteRow { space_id, key }))
            }
            2 => {
                let (key, consumed) = read_key(rest)?;
                Ok(LogRecordBody::Update(UpdateRow {
                    space_id,
                    key,
                    tuple: Tuple::deserialize(&rest[consumed..])?,
                }))
            }
            _ => Err(anyhow!("invalid log record type id: {}", type_id)),
        }
    }
}

fn write_key(key: &[u8], buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buffer.extend_from_slice(key);
}

fn read_key(bytes: &[u8]) -> Result<(Box<[u8]>, usize)> {
    let size = u32::from_be_bytes(
        bytes
            .get(0..4)
            .ok_or_else(|| anyhow!("truncated key size"))?
            .try_into()?,
    ) as usize;
    let key = bytes
        .get(4..4 + size)
        .ok_or_else(|| anyhow!("truncated key"))?;
    Ok((key.into(), 4 + size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tuple(fields: &[&str]) -> Tuple {
        Tuple::from(fields.iter().map(|f| f.as_bytes().to_vec()).collect::<Vec<_>>())
    }

    #[test]
    fn test_log_manager() -> Result<()> {
        let dir = tempdir()?;
        let log_file_path = dir.path().join("wal.log");
        let path = log_file_path.to_str().ok_or_else(|| anyhow!("path"))?;
        let mut log_manager = LogManager::new(path)?;
        assert_eq!(log_manager.next_lsn(), LSN(1));

        let lsn = log_manager.append(&LogRecordBody::Replace(ReplaceRow {
            space_id: SpaceID(0),
            tuple: tuple(&["k1", "first"]),
        }))?;
        assert_eq!(lsn, LSN(1));
        log_manager.append(&LogRecordBody::Update(UpdateRow {
            space_id: SpaceID(0),
            key: b"k1".to_vec().into(),
            tuple: tuple(&["k2", "second"]),
        }))?;
        let lsn = log_manager.write(&LogRecordBody::Delete(DeleteRow {
            space_id: SpaceID(1),
            key: b"k2".to_vec().into(),
        }))?;
        assert_eq!(lsn, LSN(3));

        let mut log_manager = LogManager::new(path)?;
        assert_eq!(log_manager.next_lsn(), LSN(4));
        let records = log_manager.read()?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].lsn, LSN(1));
        assert_eq!(
            records[0].body,
            LogRecordBody::Replace(ReplaceRow {
                space_id: SpaceID(0),
                tuple: tuple(&["k1", "first"]),
            })
        );
        assert_eq!(records[1].lsn, LSN(2));
        assert_eq!(
            records[1].body,
            LogRecordBody::Update(UpdateRow {
                space_id: SpaceID(0),
                key: b"k1".to_vec().into(),
                tuple: tuple(&["k2", "second"]),
            })
        );
        assert_eq!(records[2].lsn, LSN(3));
        assert_eq!(records[2].body.space_id(), SpaceID(1));
        Ok(())
    }

    #[test]
    fn test_unflushed_rows_are_lost() -> Result<()> {
        let dir = tempdir()?;
        let log_file_path = dir.path().join("wal.log");
        let path = log_file_path.to_str().ok_or_else(|| anyhow!("path"))?;
        let mut log_manager = LogManager::new(path)?;
        log_manager.write(&LogRecordBody::Delete(DeleteRow {
            space_id: SpaceID(0),
            key: b"a".to_vec().into(),
        }))?;
        log_manager.append(&LogRecordBody::Delete(DeleteRow {
            space_id: SpaceID(0),
            key: b"b".to_vec().into(),
        }))?;
        drop(log_manager);

        let mut log_manager = LogManager::new(path)?;
        assert_eq!(log_manager.read()?.len(), 1);
        assert_eq!(log_manager.next_lsn(), LSN(2));
        Ok(())
    }

    #[test]
    fn test_torn_tail_is_truncated() -> Result<()> {
        let dir = tempdir()?;
        let log_file_path = dir.path().join("wal.log");
        let path = log_file_path.to_str().ok_or_else(|| anyhow!("path"))?;
        let mut log_manager = LogManager::new(path)?;
        log_manager.write(&LogRecordBody::Replace(ReplaceRow {
            space_id: SpaceID(0),
            tuple: tuple(&["k", "v"]),
        }))?;
        drop(log_manager);
        let valid_len = fs::metadata(&log_file_path)?.len();

        let mut file = OpenOptions::new().append(true).open(&log_file_path)?;
        file.write_all(&[0, 0, 0, 0, 0, 0, 0, 2, 0, 0])?;
        drop(file);

        let mut log_manager = LogManager::new(path)?;
        assert_eq!(fs::metadata(&log_file_path)?.len(), valid_len);
        log_manager.write(&LogRecordBody::Delete(DeleteRow {
            space_id: SpaceID(0),
            key: b"k".to_vec().into(),
        }))?;
        let records = log_manager.read()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].lsn, LSN(2));
        Ok(())
    }

    #[test]
    fn test_large_row() -> Result<()> {
        let dir = tempdir()?;
        let log_file_path = dir.path().join("wal.log");
        let path = log_file_path.to_str().ok_or_else(|| anyhow!("path"))?;
        let mut log_manager = LogManager::new(path)?;
        let big = Tuple::from(vec![b"k".to_vec(), vec![7u8; LOG_BUFFER_SIZE * 3]]);
        log_manager.write(&LogRecordBody::Replace(ReplaceRow {
            space_id: SpaceID(0),
            tuple: big.clone(),
        }))?;
        let records = LogManager::new(path)?.read()?;
        assert_eq!(
            records[0].body,
            LogRecordBody::Replace(ReplaceRow {
                space_id: SpaceID(0),
                tuple: big,
            })
        );
        Ok(())
    }

    #[test]
    fn test_failed_write_is_not_logged() -> Result<()> {
        let dir = tempdir()?;
        let log_file_path = dir.path().join("wal.log");
        let path = log_file_path.to_str().ok_or_else(|| anyhow!("path"))?;
        let mut log_manager = LogManager::new(path)?;

        // writes through a read-only handle fail
        log_manager.log_file = File::open(path)?;
        let result = log_manager.write(&LogRecordBody::Replace(ReplaceRow {
            space_id: SpaceID(0),
            tuple: tuple(&["rejected", "x"]),
        }));
        assert!(result.is_err());
        assert_eq!(log_manager.next_lsn(), LSN(1));

        log_manager.log_file = OpenOptions::new().read(true).write(true).open(path)?;
        log_manager.log_file.seek(SeekFrom::End(0))?;
        let lsn = log_manager.write(&LogRecordBody::Replace(ReplaceRow {
            space_id: SpaceID(0),
            tuple: tuple(&["accepted", "y"]),
        }))?;
        assert_eq!(lsn, LSN(1));

        let records = LogManager::new(path)?.read()?;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            LogRecord {
                lsn: LSN(1),
                body: LogRecordBody::Replace(ReplaceRow {
                    space_id: SpaceID(0),
                    tuple: tuple(&["accepted", "y"]),
                }),
            }
        );
        Ok(())
    }
}
