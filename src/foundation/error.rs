pub type CutlineResult<T> = Result<T, CutlineError>;

#[derive(thiserror::Error, Debug)]
pub enum CutlineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("timeline error: {0}")]
    Timeline(String),

    #[error("animation error: {0}")]
    Animation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CutlineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }

    pub fn animation(msg: impl Into<String>) -> Self {
        Self::Animation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
