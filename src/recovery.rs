use anyhow::{anyhow, Result};
use tracing::info;

use crate::{
    common::LSN,
    log::LogRecord,
    space::Space,
};

/// Rebuilds spaces by replaying the write-ahead log from the start.
pub struct RecoveryManager {
    log_records: Vec<LogRecord>,
}

impl RecoveryManager {
    pub fn new(log_records: Vec<LogRecord>) -> Self {
        Self { log_records }
    }

    /// Replays every row in LSN order. Returns the last applied LSN.
    pub fn recover(self, spaces: &mut [Space]) -> Result<Option<LSN>> {
        let mut last_lsn = None;
        let count = self.log_records.len();
        for log_record in self.log_records {
            if last_lsn.is_some_and(|lsn: LSN| lsn >= log_record.lsn) {
                return Err(anyhow!("log sequence is not increasing at {:?}", log_record.lsn));
            }
            let space_id = log_record.body.space_id();
            let space = spaces.get_mut(space_id.0 as usize).ok_or_else(|| {
                anyhow!(
                    "log record {:?} refers to unknown space {}",
                    log_record.lsn,
                    space_id.0
                )
            })?;
            space.commit(log_record.body);
            last_lsn = Some(log_record.lsn);
        }
        info!(rows = count, last_lsn = ?last_lsn, "recovery finished");
        Ok(last_lsn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::SpaceID,
        log::{DeleteRow, LogRecordBody, ReplaceRow, UpdateRow},
        tuple::Tuple,
    };

    fn tuple(fields: &[&str]) -> Tuple {
        Tuple::from(fields.iter().map(|f| f.as_bytes().to_vec()).collect::<Vec<_>>())
    }

    fn record(lsn: u64, body: LogRecordBody) -> LogRecord {
        LogRecord { lsn: LSN(lsn), body }
    }

    #[test]
    fn test_recover() -> Result<()> {
        let records = vec![
            record(
                1,
                LogRecordBody::Replace(ReplaceRow {
                    space_id: SpaceID(0),
                    tuple: tuple(&["a", "1"]),
                }),
            ),
            record(
                2,
                LogRecordBody::Replace(ReplaceRow {
                    space_id: SpaceID(1),
                    tuple: tuple(&["b", "2"]),
                }),
            ),
            record(
                3,
                LogRecordBody::Update(UpdateRow {
                    space_id: SpaceID(0),
                    key: b"a".to_vec().into(),
                    tuple: tuple(&["c", "1", "x"]),
                }),
            ),
            record(
                4,
                LogRecordBody::Delete(DeleteRow {
                    space_id: SpaceID(1),
                    key: b"b".to_vec().into(),
                }),
            ),
        ];
        let mut spaces = vec![Space::new(SpaceID(0)), Space::new(SpaceID(1))];
        let last_lsn = RecoveryManager::new(records).recover(&mut spaces)?;
        assert_eq!(last_lsn, Some(LSN(4)));
        assert_eq!(spaces[0].get(b"a"), None);
        assert_eq!(spaces[0].get(b"c"), Some(&tuple(&["c", "1", "x"])));
        assert!(spaces[1].is_empty());
        Ok(())
    }

    #[test]
    fn test_recover_empty() -> Result<()> {
        let mut spaces = vec![Space::new(SpaceID(0))];
        assert_eq!(RecoveryManager::new(vec![]).recover(&mut spaces)?, None);
        Ok(())
    }

    #[test]
    fn test_unknown_space() {
        let records = vec![record(
            1,
            LogRecordBody::Delete(DeleteRow {
                space_id: SpaceID(3),
                key: b"a".to_vec().into(),
            }),
        )];
        let mut spaces = vec![Space::new(SpaceID(0))];
        assert!(RecoveryManager::new(records).recover(&mut spaces).is_err());
    }

    #[test]
    fn test_lsn_must_increase() {
        let row = || {
            LogRecordBody::Delete(DeleteRow {
                space_id: SpaceID(0),
                key: b"a".to_vec().into(),
            })
        };
        let records = vec![record(2, row()), record(2, row())];
        let mut spaces = vec![Space::new(SpaceID(0))];
        assert!(RecoveryManager::new(records).recover(&mut spaces).is_err());
    }
}
