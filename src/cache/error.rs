use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation `{op}` timed out")]
    Timeout { op: &'static str },
    #[error("cached value could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("cached value under `{key}` is corrupt: {detail}")]
    Corrupt { key: String, detail: String },
    #[error("value under `{key}` has the wrong type for this operation")]
    WrongType { key: String },
    #[error("script `{script}` returned unexpected reply {reply}")]
    UnexpectedReply { script: &'static str, reply: i64 },
    #[error("script `{0}` is not supported by this backend")]
    UnsupportedScript(&'static str),
    #[error("script `{script}` received malformed arguments: {detail}")]
    ScriptArguments { script: &'static str, detail: String },
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
