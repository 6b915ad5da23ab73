//! Partial tuple updates: a batch of field operations applied in order to a
//! copy of a stored tuple.

pub mod interpreter;
pub mod operation;
pub mod parser;

pub use interpreter::{apply, update};
pub use operation::{ArithOp, OpCode, Operation};
pub use parser::{parse, OperationBatch};
