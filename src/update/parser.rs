use crate::{
    common::MAX_UPDATE_OPS,
    error::{DecodeError, ParseError},
    tuple::{read_field, read_u32},
};

use super::operation::{ArithOp, OpCode, Operation};

const OP_HEADER_SIZE: usize = 5;

/// An immutable, validated sequence of update operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationBatch {
    operations: Vec<Operation>,
}

impl OperationBatch {
    /// Validates already-built operations against the cardinality of the
    /// tuple they will be applied to.
    pub fn from_operations(
        target_cardinality: u32,
        operations: Vec<Operation>,
    ) -> Result<Self, ParseError> {
        if operations.len() > MAX_UPDATE_OPS {
            return Err(ParseError::TooManyOps(operations.len()));
        }
        // Only `Set` can grow the tuple, and by one field at most, so a field
        // number past this bound can never be reached.
        let mut reachable = u64::from(target_cardinality);
        for (index, operation) in operations.iter().enumerate() {
            let field_no = operation.field_no();
            if u64::from(field_no) > reachable {
                return Err(ParseError::FieldOutOfRange {
                    index,
                    field_no,
                    cardinality: target_cardinality,
                });
            }
            if let Operation::Set { .. } = operation {
                reachable += 1;
            }
        }
        Ok(Self { operations })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn serialize(&self) -> Box<[u8]> {
        let mut buffer = Vec::new();
        for operation in &self.operations {
            operation.serialize(&mut buffer);
        }
        buffer.into()
    }
}

/// Parses `op_count` wire-encoded operations. `bytes` must hold exactly the
/// op list.
pub fn parse(
    target_cardinality: u32,
    bytes: &[u8],
    op_count: u32,
) -> Result<OperationBatch, ParseError> {
    let op_count = op_count as usize;
    if op_count > MAX_UPDATE_OPS {
        return Err(ParseError::TooManyOps(op_count));
    }
    let mut operations = Vec::with_capacity(op_count);
    let mut offset = 0;
    for index in 0..op_count {
        let (operation, consumed) = parse_operation(index, &bytes[offset..])?;
        operations.push(operation);
        offset += consumed;
    }
    if offset != bytes.len() {
        return Err(DecodeError::TrailingBytes(bytes.len() - offset).into());
    }
    OperationBatch::from_operations(target_cardinality, operations)
}

fn parse_operation(index: usize, bytes: &[u8]) -> Result<(Operation, usize), ParseError> {
    let field_no = read_u32(bytes)?;
    let code = *bytes.get(4).ok_or(DecodeError::Truncated {
        needed: OP_HEADER_SIZE,
        remaining: bytes.len(),
    })?;
    let (arg, consumed) = read_field(&bytes[OP_HEADER_SIZE..])?;
    let op_code = OpCode::try_from(code).map_err(|code| ParseError::UnknownOp { index, code })?;
    let malformed = |reason| ParseError::MalformedOperand { index, reason };

    let operation = match op_code {
        OpCode::Set => Operation::set(field_no, arg),
        OpCode::Add | OpCode::And | OpCode::Xor | OpCode::Or => {
            let operand =
                read_i32(arg).ok_or_else(|| malformed("arithmetic operand must be 4 bytes"))?;
            let op = match op_code {
                OpCode::Add => ArithOp::Add,
                OpCode::And => ArithOp::And,
                OpCode::Xor => ArithOp::Xor,
                _ => ArithOp::Or,
            };
            Operation::arith(field_no, op, operand)
        }
        OpCode::Splice => {
            let (offset, mut pos) =
                read_field(arg).map_err(|_| malformed("splice offset is missing"))?;
            let (length, consumed) =
                read_field(&arg[pos..]).map_err(|_| malformed("splice length is missing"))?;
            pos += consumed;
            let (value, consumed) =
                read_field(&arg[pos..]).map_err(|_| malformed("splice value is missing"))?;
            pos += consumed;
            if pos != arg.len() {
                return Err(malformed("trailing bytes in splice argument"));
            }
            let offset =
                read_i32(offset).ok_or_else(|| malformed("splice offset must be 4 bytes"))?;
            let length =
                read_i32(length).ok_or_else(|| malformed("splice length must be 4 bytes"))?;
            Operation::splice(field_no, offset, length, value)
        }
        OpCode::Delete => {
            if !arg.is_empty() {
                return Err(malformed("delete takes no argument"));
            }
            Operation::delete(field_no)
        }
    };
    Ok((operation, OP_HEADER_SIZE + consumed))
}

fn read_i32(bytes: &[u8]) -> Option<i32> {
    <[u8; 4]>::try_from(bytes).ok().map(i32::from_le_bytes)
}
