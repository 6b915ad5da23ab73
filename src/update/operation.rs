use crate::tuple::write_field;

/// Wire codes of the update operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Set,
    Add,
    And,
    Xor,
    Or,
    Splice,
    Delete,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;
    fn try_from(code: u8) -> Result<Self, u8> {
        match code {
            0 => Ok(OpCode::Set),
            1 => Ok(OpCode::Add),
            2 => Ok(OpCode::And),
            3 => Ok(OpCode::Xor),
            4 => Ok(OpCode::Or),
            5 => Ok(OpCode::Splice),
            6 => Ok(OpCode::Delete),
            _ => Err(code),
        }
    }
}
impl From<OpCode> for u8 {
    fn from(code: OpCode) -> Self {
        match code {
            OpCode::Set => 0,
            OpCode::Add => 1,
            OpCode::And => 2,
            OpCode::Xor => 3,
            OpCode::Or => 4,
            OpCode::Splice => 5,
            OpCode::Delete => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    And,
    Or,
    Xor,
}

impl ArithOp {
    /// Addition wraps around; the bitwise ops work on the raw 32-bit pattern.
    pub fn eval(self, value: i32, operand: i32) -> i32 {
        match self {
            ArithOp::Add => value.wrapping_add(operand),
            ArithOp::And => value & operand,
            ArithOp::Or => value | operand,
            ArithOp::Xor => value ^ operand,
        }
    }

    pub fn op_code(self) -> OpCode {
        match self {
            ArithOp::Add => OpCode::Add,
            ArithOp::And => OpCode::And,
            ArithOp::Or => OpCode::Or,
            ArithOp::Xor => OpCode::Xor,
        }
    }
}

/// One validated update operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Set {
        field_no: u32,
        value: Vec<u8>,
    },
    Arith {
        field_no: u32,
        op: ArithOp,
        operand: i32,
    },
    Splice {
        field_no: u32,
        offset: i32,
        length: i32,
        value: Vec<u8>,
    },
    Delete {
        field_no: u32,
    },
}

impl Operation {
    pub fn set(field_no: u32, value: impl Into<Vec<u8>>) -> Self {
        Operation::Set {
            field_no,
            value: value.into(),
        }
    }

    pub fn arith(field_no: u32, op: ArithOp, operand: i32) -> Self {
        Operation::Arith {
            field_no,
            op,
            operand,
        }
    }

    pub fn splice(field_no: u32, offset: i32, length: i32, value: impl Into<Vec<u8>>) -> Self {
        Operation::Splice {
            field_no,
            offset,
            length,
            value: value.into(),
        }
    }

    pub fn delete(field_no: u32) -> Self {
        Operation::Delete { field_no }
    }

    pub fn field_no(&self) -> u32 {
        match self {
            Operation::Set { field_no, .. }
            | Operation::Arith { field_no, .. }
            | Operation::Splice { field_no, .. }
            | Operation::Delete { field_no } => *field_no,
        }
    }

    pub fn op_code(&self) -> OpCode {
        match self {
            Operation::Set { .. } => OpCode::Set,
            Operation::Arith { op, .. } => op.op_code(),
            Operation::Splice { .. } => OpCode::Splice,
            Operation::Delete { .. } => OpCode::Delete,
        }
    }

    /// Appends the wire form: field number, op code, then the argument as
    /// one length-prefixed field.
    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.field_no().to_le_bytes());
        buffer.push(self.op_code().into());
        match self {
            Operation::Set { value, .. } => write_field(value, buffer),
            Operation::Arith { operand, .. } => write_field(&operand.to_le_bytes(), buffer),
            Operation::Splice {
                offset,
                length,
                value,
                ..
            } => {
                let mut arg = Vec::new();
                write_field(&offset.to_le_bytes(), &mut arg);
                write_field(&length.to_le_bytes(), &mut arg);
                write_field(value, &mut arg);
                write_field(&arg, buffer);
            }
            Operation::Delete { .. } => write_field(&[], buffer),
        }
    }
}
