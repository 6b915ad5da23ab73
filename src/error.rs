use thiserror::Error;

/// Malformed tuple bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("malformed varint length prefix")]
    MalformedLength,
    #[error("{0} trailing bytes after tuple")]
    TrailingBytes(usize),
}

/// Rejection of an operation batch before any tuple state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("op #{index}: unknown op code {code}")]
    UnknownOp { index: usize, code: u8 },
    #[error("op #{index}: malformed operand: {reason}")]
    MalformedOperand { index: usize, reason: &'static str },
    #[error("op #{index}: field {field_no} out of range (cardinality {cardinality})")]
    FieldOutOfRange {
        index: usize,
        field_no: u32,
        cardinality: u32,
    },
    #[error("too many operations: {0}")]
    TooManyOps(usize),
    #[error("malformed op list: {0}")]
    Decode(#[from] DecodeError),
}

/// Failure of an update batch. Carries the index of the failing operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("op #{index}: field {field_no} out of range (cardinality {cardinality})")]
    FieldOutOfRange {
        index: usize,
        field_no: u32,
        cardinality: u32,
    },
    #[error("op #{index}: field {field_no} is {size} bytes, expected 4")]
    FieldSizeMismatch {
        index: usize,
        field_no: u32,
        size: usize,
    },
}

impl UpdateError {
    /// Index of the operation that failed, if the failure is tied to one.
    pub fn op_index(&self) -> Option<usize> {
        match self {
            UpdateError::Parse(ParseError::UnknownOp { index, .. })
            | UpdateError::Parse(ParseError::MalformedOperand { index, .. })
            | UpdateError::Parse(ParseError::FieldOutOfRange { index, .. })
            | UpdateError::FieldOutOfRange { index, .. }
            | UpdateError::FieldSizeMismatch { index, .. } => Some(*index),
            UpdateError::Parse(_) => None,
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            UpdateError::FieldOutOfRange { .. }
                | UpdateError::Parse(ParseError::FieldOutOfRange { .. })
        )
    }
}

/// Request level failures reported back to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpaceError {
    #[error("no such space: {0}")]
    NoSuchSpace(u32),
    #[error("no such index: {0}")]
    NoSuchIndex(u32),
    #[error("tuple already exists")]
    TupleFound,
    #[error("tuple not found")]
    TupleNotFound,
    #[error("tuple has no key field")]
    MissingKey,
    #[error("illegal parameters: {0}")]
    IllegalParams(&'static str),
    #[error("unknown request type: {0:#x}")]
    UnknownRequest(u32),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Update(#[from] UpdateError),
}

impl SpaceError {
    /// Stable reply code sent over the wire.
    pub fn code(&self) -> u32 {
        match self {
            SpaceError::IllegalParams(_) | SpaceError::Decode(_) => 0x0202,
            SpaceError::UnknownRequest(_) => 0x3002,
            SpaceError::NoSuchSpace(_) => 0x3902,
            SpaceError::NoSuchIndex(_) => 0x3502,
            SpaceError::TupleFound => 0x3702,
            SpaceError::TupleNotFound => 0x3102,
            SpaceError::MissingKey => 0x2702,
            SpaceError::Update(UpdateError::FieldSizeMismatch { .. }) => 0x1e02,
            SpaceError::Update(e) if e.is_out_of_range() => 0x3602,
            SpaceError::Update(_) => 0x0202,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_index() {
        let err = UpdateError::FieldSizeMismatch {
            index: 3,
            field_no: 1,
            size: 5,
        };
        assert_eq!(err.op_index(), Some(3));
        let err = UpdateError::from(ParseError::TooManyOps(129));
        assert_eq!(err.op_index(), None);
        let err = UpdateError::from(ParseError::UnknownOp { index: 7, code: 9 });
        assert_eq!(err.op_index(), Some(7));
    }

    #[test]
    fn test_codes() {
        let out_of_range = UpdateError::FieldOutOfRange {
            index: 0,
            field_no: 5,
            cardinality: 2,
        };
        let parse_out_of_range = UpdateError::Parse(ParseError::FieldOutOfRange {
            index: 0,
            field_no: 5,
            cardinality: 2,
        });
        assert_eq!(
            SpaceError::from(out_of_range).code(),
            SpaceError::from(parse_out_of_range).code()
        );
        assert_ne!(SpaceError::TupleFound.code(), SpaceError::TupleNotFound.code());
    }

    #[test]
    fn test_display() {
        let err = UpdateError::FieldSizeMismatch {
            index: 2,
            field_no: 1,
            size: 3,
        };
        assert_eq!(err.to_string(), "op #2: field 1 is 3 bytes, expected 4");
        let err = SpaceError::from(DecodeError::TrailingBytes(2));
        assert_eq!(err.to_string(), "2 trailing bytes after tuple");
    }
}
