use std::cmp::Ordering;

use crate::{error::UpdateError, tuple::Tuple};

use super::{
    operation::Operation,
    parser::{parse, OperationBatch},
};

/// Parses a wire-encoded op list against `tuple` and applies it.
pub fn update(tuple: &Tuple, bytes: &[u8], op_count: u32) -> Result<Tuple, UpdateError> {
    let batch = parse(tuple.cardinality(), bytes, op_count)?;
    apply(tuple, &batch)
}

/// Folds the batch over a copy of `tuple`. Each operation sees the tuple as
/// left by the operations before it; the first failure aborts the batch and
/// the copy is dropped.
pub fn apply(tuple: &Tuple, batch: &OperationBatch) -> Result<Tuple, UpdateError> {
    batch
        .iter()
        .enumerate()
        .try_fold(tuple.clone(), |working, (index, operation)| {
            apply_operation(working, index, operation)
        })
}

fn apply_operation(
    mut tuple: Tuple,
    index: usize,
    operation: &Operation,
) -> Result<Tuple, UpdateError> {
    let cardinality = tuple.cardinality();
    let field_no = operation.field_no();
    let out_of_range = || UpdateError::FieldOutOfRange {
        index,
        field_no,
        cardinality,
    };

    match operation {
        Operation::Set { value, .. } => match field_no.cmp(&cardinality) {
            Ordering::Less => {
                let field = tuple.field_mut(field_no).ok_or_else(out_of_range)?;
                field.clone_from(value);
            }
            Ordering::Equal => tuple.push(value.clone()),
            Ordering::Greater => return Err(out_of_range()),
        },
        Operation::Arith { op, operand, .. } => {
            let field = tuple.field_mut(field_no).ok_or_else(out_of_range)?;
            let bytes = <[u8; 4]>::try_from(field.as_slice()).map_err(|_| {
                UpdateError::FieldSizeMismatch {
                    index,
                    field_no,
                    size: field.len(),
                }
            })?;
            let result = op.eval(i32::from_le_bytes(bytes), *operand);
            field.copy_from_slice(&result.to_le_bytes());
        }
        Operation::Splice {
            offset,
            length,
            value,
            ..
        } => {
            let field = tuple.field_mut(field_no).ok_or_else(out_of_range)?;
            let (start, end) = splice_bounds(field.len(), *offset, *length);
            field.splice(start..end, value.iter().copied());
        }
        Operation::Delete { .. } => {
            if field_no >= cardinality {
                return Err(out_of_range());
            }
            tuple.remove(field_no);
        }
    }
    Ok(tuple)
}

/// Normalizes slice-style `offset` and `length` against a field of `len`
/// bytes into a `start..end` range. Negative values count from the end and
/// everything is clamped into the field, so `start <= end <= len`.
pub fn splice_bounds(len: usize, offset: i32, length: i32) -> (usize, usize) {
    let len = len as i64;
    let offset = i64::from(offset);
    let length = i64::from(length);
    let start = if offset < 0 {
        (len + offset).max(0)
    } else {
        offset.min(len)
    };
    let end = if length < 0 {
        (len + length).max(start)
    } else {
        (start + length).min(len)
    };
    (start as usize, end as usize)
}
