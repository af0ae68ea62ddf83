use thiserror::Error;

pub type Result<T> = std::result::Result<T, PtahError>;

#[derive(Error, Debug)]
pub enum PtahError {
    #[error("Malformed host payload: {0}")]
    MalformedPayload(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Missing required parameters: {}", .0.join(", "))]
    InvalidParameters(Vec<String>),

    #[error("No template selected")]
    NoTemplateSelected,

    #[error("Host transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameters_message() {
        let err = PtahError::InvalidParameters(vec!["code".into(), "lang".into()]);
        assert_eq!(err.to_string(), "Missing required parameters: code, lang");
    }
}
