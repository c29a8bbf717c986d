use reqwest::StatusCode;

/// Errors that end a stream connection
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The controller could not be reached at all
    #[error("controller is unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The request failed after the connection was attempted
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The controller answered with a non-success status
    #[error("controller responded with {0}")]
    Status(StatusCode),

    /// Reading the response body failed mid-stream
    #[error("stream read failed: {0}")]
    Read(#[source] reqwest::Error),

    /// The controller ended the response
    #[error("controller closed the stream")]
    Closed,
}

impl StreamError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unreachable(err)
        } else {
            Self::Request(err)
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// A segment of the byte stream that could not be turned into a JSON message
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("incomplete message exceeded {limit} bytes")]
    Overflow { limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_error_is_unreachable() {
        // Port 1 is reserved and nothing listens on it
        let err = reqwest::get("http://127.0.0.1:1/v1/presentation/active")
            .await
            .unwrap_err();
        let err = StreamError::from_reqwest(err);
        assert!(err.is_unreachable(), "got: {err}");
    }

    #[test]
    fn builder_error_is_a_request_error() {
        let err = reqwest::Client::new()
            .get("htp://[bad")
            .build()
            .unwrap_err();
        assert!(matches!(
            StreamError::from_reqwest(err),
            StreamError::Request(_)
        ));
    }

    #[test]
    fn status_display() {
        let err = StreamError::Status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            err.to_string(),
            "controller responded with 503 Service Unavailable"
        );
    }

    #[test]
    fn overflow_display() {
        let err = DecodeError::Overflow { limit: 16 };
        assert_eq!(err.to_string(), "incomplete message exceeded 16 bytes");
    }
}
