pub type StitchResult<T> = Result<T, StitchError>;

#[derive(thiserror::Error, Debug)]
pub enum StitchError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StitchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
