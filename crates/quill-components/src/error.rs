//! Error types for quill components.

use thiserror::Error;

use quill_llm::ApiError;

/// Errors raised while building, (de)serializing or running a component.
#[derive(Error, Debug)]
pub enum ComponentError {
    /// No API key was passed and none could be read from the environment.
    #[error(
        "{component} expects an OpenAI API key. Set the {env_var} environment variable (recommended) or pass it explicitly."
    )]
    MissingApiKey {
        /// Component type that failed to build.
        component: &'static str,
        /// Environment variable that was consulted.
        env_var: &'static str,
    },

    /// A serialized callback reference has no entry in the callback registry.
    #[error("streaming callback '{0}' is not registered")]
    UnknownCallback(String),

    /// A component descriptor could not be turned back into a component.
    #[error("cannot deserialize component: {0}")]
    Deserialization(String),

    /// The inputs handed to a component are malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The remote call failed. Passed through untouched.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience type alias for component operations.
pub type Result<T> = std::result::Result<T, ComponentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_missing_api_key() {
        let err = ComponentError::MissingApiKey {
            component: "GptGenerator",
            env_var: "OPENAI_API_KEY",
        };
        assert!(
            err.to_string()
                .starts_with("GptGenerator expects an OpenAI API key")
        );
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn display_unknown_callback() {
        let err = ComponentError::UnknownCallback("my_crate::print".into());
        assert_eq!(
            err.to_string(),
            "streaming callback 'my_crate::print' is not registered"
        );
    }

    #[test]
    fn api_error_is_transparent() {
        let err: ComponentError = ApiError::ModelNotFound {
            model: "gpt-x".into(),
            message: "does not exist".into(),
        }
        .into();
        assert_eq!(err.to_string(), "model 'gpt-x' not found: does not exist");
        assert!(matches!(
            err,
            ComponentError::Api(ApiError::ModelNotFound { .. })
        ));
    }
}
