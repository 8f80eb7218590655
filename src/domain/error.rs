use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Reject blank required text fields.
pub fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("`{field}` must not be empty")));
    }
    Ok(())
}

/// Business-type tags are stored in VARCHAR(128) columns and embedded in cache keys.
pub fn ensure_biz(biz: &str) -> Result<(), DomainError> {
    ensure_non_empty(biz, "biz")?;
    if biz.len() > 128 {
        return Err(DomainError::validation("`biz` exceeds 128 bytes"));
    }
    if biz.contains(':') {
        return Err(DomainError::validation("`biz` must not contain `:`"));
    }
    Ok(())
}
