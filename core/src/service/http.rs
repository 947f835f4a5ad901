use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::ExecutionService;
use crate::config::ServiceConfig;
use crate::error::Fault;
use crate::memory_edit::MemoryEdit;
use crate::types::{AssembleRequest, FlagConfiguration, ServiceErrorBody, ServiceResponse};

/// JSON-over-HTTP client for the simulator service
#[derive(Debug, Clone)]
pub struct HttpExecutionService {
    client: Client,
    base_url: String,
}

impl HttpExecutionService {
    pub fn new(config: &ServiceConfig) -> Result<Self, Fault> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Fault::service(format!("Failed to build HTTP client: {}", e), None))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<ServiceResponse, Fault> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "service request");

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_fault)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_fault)?;

        decode_response(status, &text)
    }
}

impl ExecutionService for HttpExecutionService {
    async fn assemble(
        &mut self,
        source: &str,
        flags: &FlagConfiguration,
    ) -> Result<ServiceResponse, Fault> {
        let body = AssembleRequest {
            code: source,
            flags,
        };
        self.post("/assemble", Some(&body)).await
    }

    async fn step_once(&mut self) -> Result<ServiceResponse, Fault> {
        self.post::<()>("/run-once", None).await
    }

    async fn reset(&mut self) -> Result<ServiceResponse, Fault> {
        self.post::<()>("/reset", None).await
    }

    async fn edit_memory(&mut self, edit: &MemoryEdit) -> Result<ServiceResponse, Fault> {
        self.post("/memory-edit", Some(edit)).await
    }
}

fn transport_fault(err: reqwest::Error) -> Fault {
    warn!(error = %err, "service request failed");
    let message = if err.is_timeout() {
        format!("Request timed out: {}", err)
    } else {
        format!("Request failed: {}", err)
    };
    Fault::service(message, None)
}

/// Turn a raw HTTP answer into a response or a fault
///
/// An empty body reads as `{}`. A non-JSON body is treated as the error
/// message itself.
fn decode_response(status: StatusCode, text: &str) -> Result<ServiceResponse, Fault> {
    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(ServiceResponse::default());
        }
        return serde_json::from_str(text).map_err(|e| {
            Fault::service(format!("Malformed service response: {}", e), None)
        });
    }

    let body: ServiceErrorBody = serde_json::from_str(text).unwrap_or_else(|_| ServiceErrorBody {
        error: (!text.trim().is_empty()).then(|| text.to_string()),
        line: None,
    });

    let message = body
        .error
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| "Request failed".to_string());

    warn!(%status, %message, line = ?body.line, "service returned an error");
    Err(Fault::service(message, body.line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success() {
        let text = r#"{"state": {"ready": true, "next_source_line": 2}, "memory": "<t/>"}"#;
        let response = decode_response(StatusCode::OK, text).unwrap();
        assert_eq!(response.state.unwrap().next_source_line, Some(2));
        assert!(response.fragments.contains_key("memory"));
    }

    #[test]
    fn test_decode_empty_success_body() {
        let response = decode_response(StatusCode::OK, "").unwrap();
        assert_eq!(response, ServiceResponse::default());
    }

    #[test]
    fn test_decode_structured_error() {
        let text = r#"{"error": "Line 3: `FOO` -> opcode not found", "line": 3}"#;
        let fault = decode_response(StatusCode::BAD_REQUEST, text).unwrap_err();
        assert_eq!(fault.message(), "Line 3: `FOO` -> opcode not found");
        assert_eq!(fault.line(), Some(3));
    }

    #[test]
    fn test_decode_error_line_from_message() {
        let text = r#"{"error": "Runtime line 8: `RET` -> stack empty", "line": null}"#;
        let fault = decode_response(StatusCode::BAD_REQUEST, text).unwrap_err();
        assert_eq!(fault.line(), Some(8));
    }

    #[test]
    fn test_decode_plain_text_error() {
        let fault =
            decode_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").unwrap_err();
        assert_eq!(fault.message(), "Internal Server Error");
        assert_eq!(fault.line(), None);
    }

    #[test]
    fn test_decode_empty_error_body() {
        let fault = decode_response(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert_eq!(fault.message(), "Request failed");
    }

    #[test]
    fn test_base_url_is_normalized() {
        let service = HttpExecutionService::new(&ServiceConfig {
            url: "http://127.0.0.1:5000/".to_string(),
            request_timeout_ms: 500,
        })
        .unwrap();
        assert_eq!(service.base_url(), "http://127.0.0.1:5000");
    }
}
