use std::collections::HashMap;

use crate::{
    common::{Flags, SpaceID},
    error::SpaceError,
    log::{DeleteRow, LogRecordBody, ReplaceRow, UpdateRow},
    tuple::Tuple,
    update,
};

/// A set of tuples with a hash primary index on field 0.
///
/// Mutations are two-phase: a `prepare_*` call validates the request against
/// the current contents and returns the row to log, `commit` applies a row.
/// Nothing becomes visible until `commit`.
pub struct Space {
    id: SpaceID,
    tuples: HashMap<Box<[u8]>, Tuple>,
}

impl Space {
    pub fn new(id: SpaceID) -> Self {
        Self {
            id,
            tuples: HashMap::new(),
        }
    }

    pub fn id(&self) -> SpaceID {
        self.id
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Tuple> {
        self.tuples.get(key)
    }

    pub fn prepare_replace(&self, tuple: Tuple, flags: Flags) -> Result<LogRecordBody, SpaceError> {
        let key = tuple.key().ok_or(SpaceError::MissingKey)?;
        let exists = self.tuples.contains_key(key);
        if flags.add() && exists {
            return Err(SpaceError::TupleFound);
        }
        if flags.replace() && !exists {
            return Err(SpaceError::TupleNotFound);
        }
        Ok(LogRecordBody::Replace(ReplaceRow {
            space_id: self.id,
            tuple,
        }))
    }

    /// Runs an update batch against the tuple stored under `key`. Returns
    /// `None` when there is no such tuple. The stored tuple is left as is.
    pub fn prepare_update(
        &self,
        key: &[u8],
        ops: &[u8],
        op_count: u32,
    ) -> Result<Option<LogRecordBody>, SpaceError> {
        let Some(old_tuple) = self.tuples.get(key) else {
            return Ok(None);
        };
        let new_tuple = update::update(old_tuple, ops, op_count)?;
        let new_key = new_tuple.key().ok_or(SpaceError::MissingKey)?;
        if new_key != key && self.tuples.contains_key(new_key) {
            return Err(SpaceError::TupleFound);
        }
        Ok(Some(LogRecordBody::Update(UpdateRow {
            space_id: self.id,
            key: key.into(),
            tuple: new_tuple,
        })))
    }

    pub fn prepare_delete(&self, key: &[u8]) -> Option<LogRecordBody> {
        self.tuples.contains_key(key).then(|| {
            LogRecordBody::Delete(DeleteRow {
                space_id: self.id,
                key: key.into(),
            })
        })
    }

    /// Applies a logged row. Returns the tuple now stored, if any.
    pub fn commit(&mut self, body: LogRecordBody) -> Option<&Tuple> {
        match body {
            LogRecordBody::Replace(row) => self.store(row.tuple),
            LogRecordBody::Update(row) => {
                self.tuples.remove(&row.key);
                self.store(row.tuple)
            }
            LogRecordBody::Delete(row) => {
                self.tuples.remove(&row.key);
                None
            }
        }
    }

    fn store(&mut self, tuple: Tuple) -> Option<&Tuple> {
        let key: Box<[u8]> = tuple.key()?.into();
        self.tuples.insert(key.clone(), tuple);
        self.tuples.get(&key)
    }

    /// Looks up every key in turn, skipping `offset` hits and returning at
    /// most `limit` tuples.
    pub fn select(&self, keys: &[&[u8]], offset: usize, limit: usize) -> Vec<Tuple> {
        keys.iter()
            .filter_map(|key| self.tuples.get(*key))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::UpdateError,
        update::{ArithOp, Operation, OperationBatch},
    };

    fn tuple(fields: &[&str]) -> Tuple {
        Tuple::from(fields.iter().map(|f| f.as_bytes().to_vec()).collect::<Vec<_>>())
    }

    fn ops(operations: Vec<Operation>) -> (Box<[u8]>, u32) {
        let count = operations.len() as u32;
        let mut bytes = vec![];
        for operation in operations {
            operation.serialize(&mut bytes);
        }
        (bytes.into(), count)
    }

    fn insert(space: &mut Space, fields: &[&str]) -> Result<(), SpaceError> {
        let body = space.prepare_replace(tuple(fields), Flags(Flags::ADD))?;
        space.commit(body);
        Ok(())
    }

    #[test]
    fn test_replace_flags() -> Result<(), SpaceError> {
        let mut space = Space::new(SpaceID(0));
        insert(&mut space, &["k", "v"])?;
        assert_eq!(
            space.prepare_replace(tuple(&["k", "w"]), Flags(Flags::ADD)),
            Err(SpaceError::TupleFound)
        );
        assert_eq!(
            space.prepare_replace(tuple(&["x"]), Flags(Flags::REPLACE)),
            Err(SpaceError::TupleNotFound)
        );
        assert_eq!(
            space.prepare_replace(Tuple::new(), Flags(0)),
            Err(SpaceError::MissingKey)
        );
        let body = space.prepare_replace(tuple(&["k", "w"]), Flags(Flags::REPLACE))?;
        // not visible before commit
        assert_eq!(space.get(b"k"), Some(&tuple(&["k", "v"])));
        assert_eq!(space.commit(body), Some(&tuple(&["k", "w"])));
        assert_eq!(space.len(), 1);
        Ok(())
    }

    #[test]
    fn test_update() -> Result<(), SpaceError> {
        let mut space = Space::new(SpaceID(0));
        insert(&mut space, &["k", "first", "hi, this is a test string!"])?;
        let (bytes, count) = ops(vec![
            Operation::splice(2, 0, 4, ""),
            Operation::set(3, 7i32.to_le_bytes()),
            Operation::arith(3, ArithOp::Add, 1),
        ]);
        let body = space
            .prepare_update(b"k", &bytes, count)?
            .ok_or(SpaceError::TupleNotFound)?;
        space.commit(body);
        let stored = space.get(b"k").cloned().ok_or(SpaceError::TupleNotFound)?;
        assert_eq!(stored.field(2), Some(&b"this is a test string!"[..]));
        assert_eq!(stored.field(3), Some(&8i32.to_le_bytes()[..]));
        Ok(())
    }

    #[test]
    fn test_update_missing_key() -> Result<(), SpaceError> {
        let space = Space::new(SpaceID(0));
        let (bytes, count) = ops(vec![Operation::set(0, "x")]);
        assert_eq!(space.prepare_update(b"nope", &bytes, count)?, None);
        Ok(())
    }

    #[test]
    fn test_failed_update_keeps_tuple() -> Result<(), SpaceError> {
        let mut space = Space::new(SpaceID(0));
        insert(&mut space, &["k", "v"])?;
        let (bytes, count) = ops(vec![
            Operation::set(1, "changed"),
            Operation::arith(1, ArithOp::Add, 1),
        ]);
        assert!(matches!(
            space.prepare_update(b"k", &bytes, count),
            Err(SpaceError::Update(UpdateError::FieldSizeMismatch { index: 1, .. }))
        ));
        assert_eq!(space.get(b"k"), Some(&tuple(&["k", "v"])));
        Ok(())
    }

    #[test]
    fn test_update_moves_key() -> Result<(), SpaceError> {
        let mut space = Space::new(SpaceID(0));
        insert(&mut space, &["a", "1"])?;
        insert(&mut space, &["b", "2"])?;
        let (bytes, count) = ops(vec![Operation::set(0, "b")]);
        assert_eq!(
            space.prepare_update(b"a", &bytes, count),
            Err(SpaceError::TupleFound)
        );
        let (bytes, count) = ops(vec![Operation::set(0, "c")]);
        let body = space
            .prepare_update(b"a", &bytes, count)?
            .ok_or(SpaceError::TupleNotFound)?;
        space.commit(body);
        assert_eq!(space.get(b"a"), None);
        assert_eq!(space.get(b"c"), Some(&tuple(&["c", "1"])));
        assert_eq!(space.len(), 2);

        let batch =
            OperationBatch::from_operations(2, vec![Operation::delete(0), Operation::delete(0)])
                .map_err(UpdateError::from)?;
        assert_eq!(
            space.prepare_update(b"c", &batch.serialize(), batch.len() as u32),
            Err(SpaceError::MissingKey)
        );
        Ok(())
    }

    #[test]
    fn test_delete_and_select() -> Result<(), SpaceError> {
        let mut space = Space::new(SpaceID(0));
        for key in ["a", "b", "c"] {
            insert(&mut space, &[key])?;
        }
        assert_eq!(space.prepare_delete(b"zz"), None);
        let body = space.prepare_delete(b"b").ok_or(SpaceError::TupleNotFound)?;
        assert_eq!(space.commit(body), None);

        let keys: [&[u8]; 3] = [b"a", b"b", b"c"];
        assert_eq!(space.select(&keys, 0, usize::MAX), vec![tuple(&["a"]), tuple(&["c"])]);
        assert_eq!(space.select(&keys, 1, usize::MAX), vec![tuple(&["c"])]);
        assert_eq!(space.select(&keys, 0, 1), vec![tuple(&["a"])]);
        Ok(())
    }
}
