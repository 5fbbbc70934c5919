#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
