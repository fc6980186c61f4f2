#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("generated name `{0}` is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("generated identifier `{0}` is already bound in this unit")]
    IdentifierCollision(String),

    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}
