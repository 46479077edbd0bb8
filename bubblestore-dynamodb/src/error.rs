/// Error type for DynamoDB persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A DynamoDB request failed for a reason other than a failed condition.
    #[error("dynamodb request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// Identifiers are stored as 16 raw bytes, so only the canonical
    /// lowercase dashed form is accepted.
    #[error("`{0}` is not a canonical lowercase uuid")]
    InvalidUuid(String),
    /// An item is missing an attribute or holds one of the wrong type.
    #[error("malformed item in table `{table}`: {reason}")]
    MalformedItem { table: String, reason: String },
    /// Event or state serialisation failed before writing.
    #[error("serialization error: {0}")]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// A stored state or event could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The table settings could not be turned into a create-table request.
    #[error("invalid table settings: {0}")]
    InvalidSettings(#[from] aws_sdk_dynamodb::error::BuildError),
}

impl Error {
    pub(crate) fn request<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Request(Box::new(error))
    }

    pub(crate) fn malformed(table: &str, reason: impl Into<String>) -> Self {
        Self::MalformedItem {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}
