use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("Column name '{0}' is not unique")]
    ColumnNameNotUnique(String),
    #[error("Column position {0} out of range")]
    ColumnPositionOutOfRange(usize),
    #[error("Join of table '{0}' references unknown parent")]
    InvalidJoinParent(String),
    #[error("Join of table '{0}' has mismatched column pair")]
    InvalidJoinColumns(String),
    #[error("Group '{0}' references unknown table")]
    InvalidGroupMember(String),
    #[error("Table id {0} assigned twice")]
    DuplicateTableId(u32),
}
