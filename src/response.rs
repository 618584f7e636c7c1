use serde::Serialize;

/// Envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn ok_empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_carries_code_and_no_data() {
        let body = serde_json::to_value(ApiResponse::err("nope", "INVALID_CREDENTIALS")).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INVALID_CREDENTIALS");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn ok_envelope_omits_error_field() {
        let body = serde_json::to_value(ApiResponse::ok("done", serde_json::json!({"n": 1}))).unwrap();
        assert_eq!(body["success"], true);
        assert!(body.get("error").is_none());
        assert_eq!(body["data"]["n"], 1);
    }
}
