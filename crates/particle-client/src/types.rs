//! Request and response types for the Particle cloud API

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::streaming::EventScope;

// =============================================================================
// Device Types
// =============================================================================

/// Device information returned by the cloud
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_app: Option<String>,
    #[serde(default)]
    pub last_ip_address: Option<String>,
    /// ISO-8601 time the cloud last heard from the device
    #[serde(default)]
    pub last_heard: Option<String>,
    #[serde(default)]
    pub product_id: Option<u32>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub cellular: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_iccid: Option<String>,
    #[serde(default)]
    pub imei: Option<String>,
    #[serde(default)]
    pub current_build_target: Option<String>,
    /// Exposed cloud variables (name -> type), only on the detail endpoint
    #[serde(default)]
    pub variables: Option<HashMap<String, String>>,
    /// Exposed cloud functions, only on the detail endpoint
    #[serde(default)]
    pub functions: Option<Vec<String>>,
}

impl Device {
    /// Scope for subscribing to this device's events
    pub fn event_scope(&self) -> EventScope {
        EventScope::Device(self.id.clone())
    }

    /// Name if set, otherwise the id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }
}

// =============================================================================
// Variable / Function Types
// =============================================================================

/// Value of a cloud variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableValue {
    pub name: String,
    /// Variable value as reported (number, string or bool)
    pub result: serde_json::Value,
    #[serde(default, rename = "coreInfo")]
    pub core_info: Option<serde_json::Value>,
}

/// Result of calling a cloud function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResult {
    pub id: String,
    #[serde(default)]
    pub last_app: Option<String>,
    #[serde(default)]
    pub connected: bool,
    pub return_value: i64,
}

/// Form body for a function call
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FunctionCall<'a> {
    pub arg: &'a str,
}

// =============================================================================
// Error Types
// =============================================================================

/// Error body returned by the cloud on failure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    /// Most descriptive message available
    pub fn message(&self) -> Option<String> {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => Some(format!("{}: {}", error, description)),
            (Some(error), None) => Some(error.clone()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_list_entry() {
        let json = r#"{
            "id": "0123456789abcdef",
            "name": "garage",
            "last_app": null,
            "last_ip_address": "10.0.0.1",
            "last_heard": "2023-01-01T00:00:00.000Z",
            "product_id": 6,
            "connected": true,
            "cellular": false,
            "status": "normal"
        }"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.id, "0123456789abcdef");
        assert_eq!(device.display_name(), "garage");
        assert_eq!(device.product_id, Some(6));
        assert!(device.connected);
        assert!(device.variables.is_none());
        assert_eq!(
            device.event_scope(),
            EventScope::Device("0123456789abcdef".into())
        );
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let device = Device {
            id: "abc".into(),
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(device.display_name(), "abc");
    }

    #[test]
    fn test_error_response_message() {
        let err: ErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_token","error_description":"expired"}"#)
                .unwrap();
        assert_eq!(err.message().as_deref(), Some("invalid_token: expired"));

        let err: ErrorResponse = serde_json::from_str(r#"{"ok":false}"#).unwrap();
        assert_eq!(err.message(), None);
    }
}
