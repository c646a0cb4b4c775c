use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdhgCoreError {
    #[error("WGPU initialization failed: {0}")]
    WgpuInitError(String),

    #[error("WGPU error: {0}")]
    WgpuError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operator has no blocks")]
    EmptyOperator,

    #[error(
        "Block {first} (rows {first_rows:?}, cols {first_cols:?}) overlaps block {second} (rows {second_rows:?}, cols {second_cols:?})"
    )]
    BlockOverlap {
        first: usize,
        first_rows: std::ops::Range<usize>,
        first_cols: std::ops::Range<usize>,
        second: usize,
        second_rows: std::ops::Range<usize>,
        second_cols: std::ops::Range<usize>,
    },

    #[error("Column {0} is not read by any block")]
    ColumnGap(usize),

    #[error("Row {0} is not written by any block")]
    RowGap(usize),

    #[error("Operator needs {requested} bytes of device memory, budget is {budget}")]
    OutOfDeviceMemory { requested: u64, budget: u64 },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
