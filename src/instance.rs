use std::{
    fs,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::{
    common::{Flags, SpaceID},
    config::Config,
    error::SpaceError,
    log::{LogManager, LogRecordBody, WalWriter},
    recovery::RecoveryManager,
    space::Space,
    tuple::Tuple,
};

/// Result of one request: how many tuples it touched and, when asked for,
/// the tuples themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub count: u32,
    pub tuples: Vec<Tuple>,
}

impl Outcome {
    fn single(tuple: Option<Tuple>, flags: Flags) -> Self {
        match tuple {
            Some(tuple) if flags.return_tuple() => Self {
                count: 1,
                tuples: vec![tuple],
            },
            _ => Self {
                count: 1,
                tuples: vec![],
            },
        }
    }
}

pub struct Instance {
    spaces: Vec<Mutex<Space>>,
    wal: Mutex<Box<dyn WalWriter>>,
}

impl Instance {
    pub fn new(dir: &str, init: bool, space_count: u32) -> Result<Self> {
        if init && fs::metadata(dir).is_ok_and(|m| m.is_dir()) {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;

        let log_file = format!("{}/wal.log", dir);
        let mut log_manager = LogManager::new(&log_file)?;
        let mut spaces = (0..space_count)
            .map(|id| Space::new(SpaceID(id)))
            .collect::<Vec<_>>();
        RecoveryManager::new(log_manager.read()?).recover(&mut spaces)?;
        info!(
            dir,
            spaces = space_count,
            next_lsn = log_manager.next_lsn().0,
            "instance opened"
        );

        Ok(Self::from_parts(spaces, Box::new(log_manager)))
    }

    /// Serves already recovered `spaces`, logging every change to `wal`.
    pub fn from_parts(spaces: Vec<Space>, wal: Box<dyn WalWriter>) -> Self {
        Self {
            spaces: spaces.into_iter().map(Mutex::new).collect(),
            wal: Mutex::new(wal),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.data_dir, config.init, config.space_count)
    }

    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    /// Stores `tuple`, replacing any tuple with the same key unless `flags`
    /// say otherwise.
    pub fn replace(&self, space_id: SpaceID, tuple: Tuple, flags: Flags) -> Result<Outcome> {
        check_flags(flags, Flags::ALLOWED)?;
        let mut space = self.lock_space(space_id)?;
        let body = space.prepare_replace(tuple, flags)?;
        let stored = self.commit(&mut space, body)?;
        Ok(Outcome::single(stored, flags))
    }

    /// Applies an encoded update batch to the tuple stored under `key`.
    /// A missing tuple is not an error; nothing is touched.
    pub fn update(
        &self,
        space_id: SpaceID,
        key: &Tuple,
        ops: &[u8],
        op_count: u32,
        flags: Flags,
    ) -> Result<Outcome> {
        check_flags(flags, Flags::RETURN_TUPLE)?;
        let key = key_field(key)?;
        let mut space = self.lock_space(space_id)?;
        let Some(body) = space.prepare_update(key, ops, op_count)? else {
            debug!(space = space_id.0, "update found no tuple");
            return Ok(Outcome::default());
        };
        let stored = self.commit(&mut space, body)?;
        Ok(Outcome::single(stored, flags))
    }

    pub fn delete(&self, space_id: SpaceID, key: &Tuple, flags: Flags) -> Result<Outcome> {
        check_flags(flags, Flags::RETURN_TUPLE)?;
        let key = key_field(key)?;
        let mut space = self.lock_space(space_id)?;
        let Some(body) = space.prepare_delete(key) else {
            return Ok(Outcome::default());
        };
        let removed = space.get(key).cloned();
        self.commit(&mut space, body)?;
        Ok(Outcome::single(removed, flags))
    }

    pub fn select(
        &self,
        space_id: SpaceID,
        index_no: u32,
        keys: &[Tuple],
        offset: u32,
        limit: u32,
    ) -> Result<Outcome> {
        if index_no != 0 {
            return Err(SpaceError::NoSuchIndex(index_no).into());
        }
        let keys = keys
            .iter()
            .map(key_field)
            .collect::<Result<Vec<_>, _>>()?;
        let space = self.lock_space(space_id)?;
        let tuples = space.select(&keys, offset as usize, limit as usize);
        Ok(Outcome {
            count: tuples.len() as u32,
            tuples,
        })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.wal.lock().map_err(|_| anyhow!("lock error"))?.flush()?;
        info!("instance shut down");
        Ok(())
    }

    fn lock_space(&self, space_id: SpaceID) -> Result<MutexGuard<'_, Space>> {
        self.spaces
            .get(space_id.0 as usize)
            .ok_or(SpaceError::NoSuchSpace(space_id.0))?
            .lock()
            .map_err(|_| anyhow!("lock error"))
    }

    /// Makes the row durable, then visible. The caller holds the space lock
    /// for the whole read-modify-write.
    fn commit(&self, space: &mut Space, body: LogRecordBody) -> Result<Option<Tuple>> {
        let lsn = self
            .wal
            .lock()
            .map_err(|_| anyhow!("lock error"))?
            .write(&body)?;
        debug!(lsn = lsn.0, space = space.id().0, "row logged");
        Ok(space.commit(body).cloned())
    }
}

fn check_flags(flags: Flags, allowed: u32) -> Result<(), SpaceError> {
    if flags.is_valid() && flags.0 & !allowed == 0 {
        Ok(())
    } else {
        Err(SpaceError::IllegalParams("unsupported flags"))
    }
}

fn key_field(key: &Tuple) -> Result<&[u8], SpaceError> {
    if key.cardinality() > 1 {
        return Err(SpaceError::IllegalParams("key must have exactly one field"));
    }
    key.key().ok_or(SpaceError::MissingKey)
}
