use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identity is empty")]
    Empty,

    #[error("Invalid onion hostname length: expected {expected} chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid character {0:?} in onion hostname")]
    InvalidCharacter(char),
}
