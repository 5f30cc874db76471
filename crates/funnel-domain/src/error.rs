use thiserror::Error;
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    ValidationError(String),
    #[error("missing field `{0}` in funnel configuration")]
    MissingField(&'static str),
}
