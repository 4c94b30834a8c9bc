//! Application error types with proper error chaining.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Model invocation failed: {0}")]
    Invocation(String),
    #[error("Empty response from model")]
    EmptyResponse,
    #[error("Timeout waiting for model response: {0}")]
    Timeout(String),
}

#[derive(Error, Debug, Clone)]
pub enum KvError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("Timeout: {0}")]
    Timeout(String),
}

#[derive(Error, Debug, Clone)]
pub enum DocStoreError {
    #[error("Connection failed: {0}")]
    Connection(String),
    /// A failure the backend attributes to the request itself (bad filter,
    /// unknown column). Carries the upstream status so the router can pass
    /// 4xx through instead of masking it as 500.
    #[error("{message}")]
    Request { status: u16, message: String },
    #[error("Timeout: {0}")]
    Timeout(String),
}

#[derive(Error, Debug, Clone)]
pub enum TableError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("{message}")]
    Request { status: u16, message: String },
    #[error("Response decode failed: {0}")]
    Decode(String),
    #[error("Timeout: {0}")]
    Timeout(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<&str> for ConfigError {
    fn from(s: &str) -> Self {
        ConfigError::ParseError(s.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
    #[error("{0}")]
    MissingField(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Validation failed: {0}")]
    Multiple(String),
}

impl From<&str> for ValidationError {
    fn from(s: &str) -> Self {
        ValidationError::InvalidFormat(s.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    DocStore(#[from] DocStoreError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Rate limit exceeded")]
    RateLimited,
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(ValidationError::Multiple(err.to_string()))
    }
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            return KvError::Connection(err.to_string());
        }
        if err.is_timeout() {
            return KvError::Timeout(err.to_string());
        }
        KvError::Command(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Kv(err.into())
    }
}

impl From<reqwest::Error> for DocStoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DocStoreError::Timeout(err.to_string())
        } else if err.is_connect() {
            DocStoreError::Connection(err.to_string())
        } else {
            DocStoreError::Request {
                status: err.status().map_or(500, |s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for TableError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TableError::Timeout(err.to_string())
        } else if err.is_decode() {
            TableError::Decode(err.to_string())
        } else {
            TableError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_conversion() {
        use validator::Validate;

        #[derive(Validate)]
        struct TestStruct {
            #[validate(length(min = 1))]
            val: String,
        }

        let s = TestStruct {
            val: "".to_string(),
        };
        let err = s.validate().unwrap_err();
        let app_err = AppError::from(err);

        assert!(matches!(
            app_err,
            AppError::Validation(ValidationError::Multiple(_))
        ));
    }

    #[test]
    fn test_config_error_from_str() {
        let err: ConfigError = "parse failure".into();
        assert!(matches!(err, ConfigError::ParseError(msg) if msg == "parse failure"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let app_err = AppError::from(json_err);
        assert!(matches!(app_err, AppError::Serialization(_)));
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "Connection failed: refused");

        let err = LlmError::Invocation("throttled".to_string());
        assert_eq!(err.to_string(), "Model invocation failed: throttled");

        let err = LlmError::EmptyResponse;
        assert_eq!(err.to_string(), "Empty response from model");

        let err = LlmError::Timeout("30s".to_string());
        assert_eq!(err.to_string(), "Timeout waiting for model response: 30s");
    }

    #[test]
    fn test_kv_error_display() {
        let err = KvError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "Connection failed: refused");

        let err = KvError::Command("WRONGTYPE".to_string());
        assert_eq!(err.to_string(), "Command failed: WRONGTYPE");

        let err = KvError::Timeout("10s".to_string());
        assert_eq!(err.to_string(), "Timeout: 10s");
    }

    #[test]
    fn test_doc_store_request_error_keeps_backend_message() {
        let err = DocStoreError::Request {
            status: 400,
            message: "column \"nme\" does not exist".to_string(),
        };
        assert_eq!(err.to_string(), "column \"nme\" does not exist");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidField {
            field: "ttl".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid field 'ttl': must be positive");

        let err = ValidationError::MissingField("Key and value are required".to_string());
        assert_eq!(err.to_string(), "Key and value are required");
    }

    #[test]
    fn test_app_error_from_kv_error() {
        let kv_err = KvError::Command("err".to_string());
        let app_err: AppError = kv_err.into();
        assert!(matches!(app_err, AppError::Kv(KvError::Command(_))));
    }

    #[test]
    fn test_app_error_from_llm_error() {
        let llm_err = LlmError::Timeout("30s".to_string());
        let app_err: AppError = llm_err.into();
        assert!(matches!(app_err, AppError::Llm(LlmError::Timeout(_))));
    }

    #[test]
    fn test_app_error_auth_display() {
        let err = AppError::Authentication("API key required".to_string());
        assert_eq!(err.to_string(), "API key required");

        let err = AppError::Authorization("Invalid API key".to_string());
        assert_eq!(err.to_string(), "Invalid API key");
    }
}
