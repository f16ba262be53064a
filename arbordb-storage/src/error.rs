use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    // codec errors
    #[error("unsupported integer width({0})")]
    UnsupportedWidth(usize),
    #[error("field of declared width {width} too narrow for {len} bytes")]
    FieldTooNarrow { len: usize, width: usize },
    #[error("unsupported charset '{0}'")]
    UnsupportedCharset(String),
    #[error("invalid string encoding")]
    InvalidStringEncoding,
    // row errors
    #[error("corrupt row")]
    CorruptRow,
    #[error("value count mismatch")]
    ValueCountMismatch,
    #[error("field type mismatch")]
    FieldTypeMismatch,
    // schema build errors
    #[error("duplicate row definition id({0})")]
    DuplicateRowDef(u32),
    #[error("duplicate table name '{0}'")]
    DuplicateTableName(String),
    #[error("duplicate ordinal {ordinal} in group '{group}'")]
    DuplicateOrdinal { group: String, ordinal: u32 },
    #[error("unknown table id({0})")]
    UnknownTable(u32),
    // table status errors
    #[error("duplicate persisted table status for id({0})")]
    DuplicateTableStatus(u32),
    #[error("row count of table id({0}) is storage-computed and cannot be set")]
    IllegalRowCountMutation(u32),
    #[error("invalid persisted table status record")]
    InvalidStatusRecord,
    #[error("table status serialization failed")]
    StatusSerialization,
}
