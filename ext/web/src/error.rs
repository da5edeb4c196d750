use deno_error::JsErrorClass;

/// The error taxonomy of spec §7, scoped to the Web Object Model and Body
/// state machine. `islet_fetch`/`islet_http`/`islet_websocket` define their
/// own narrower enums for their components but reuse these variants via
/// `#[from]` where a web-object operation can fail underneath them.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Body already read")]
    BodyAlreadyRead,

    #[error("Failed to execute '{method}' on '{target}': stream is locked")]
    StreamLock { target: &'static str, method: &'static str },

    #[error("Failed to construct '{what}': GET/HEAD requests cannot have a body")]
    BodyWithGetOrHead { what: &'static str },

    #[error(transparent)]
    Abort(#[from] AbortError),

    #[error("Failed to decode text: {0}")]
    Encoding(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    TypeError(String),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("The operation was aborted")]
pub struct AbortError {
    pub reason: serde_json::Value,
}

impl JsErrorClass for WebError {
    fn get_class(&self) -> std::borrow::Cow<'static, str> {
        match self {
            WebError::Abort(_) => "AbortError".into(),
            WebError::InvalidUrl(_) => "TypeError".into(),
            _ => "TypeError".into(),
        }
    }

    fn get_message(&self) -> std::borrow::Cow<'static, str> {
        self.to_string().into()
    }

    fn get_additional_properties(
        &self,
    ) -> Vec<(std::borrow::Cow<'static, str>, std::borrow::Cow<'static, str>)> {
        Vec::new()
    }
}

impl JsErrorClass for AbortError {
    fn get_class(&self) -> std::borrow::Cow<'static, str> {
        "AbortError".into()
    }

    fn get_message(&self) -> std::borrow::Cow<'static, str> {
        self.to_string().into()
    }

    fn get_additional_properties(
        &self,
    ) -> Vec<(std::borrow::Cow<'static, str>, std::borrow::Cow<'static, str>)> {
        Vec::new()
    }
}
