//! Shared protocol types and constants for the devpack peer channel
//!
//! Every text frame is a JSON object. Archives travel as raw binary frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::DecodeError;

/// File name of the archive written into the base directory of each job
pub const ARCHIVE_FILE_NAME: &str = "filtered-archive.zip";

/// Default artifact looked up for device requests
pub const DEFAULT_ARTIFACT: &str = "severin.exe";

// Inbound discriminators
pub const TYPE_FILE_PATH: &str = "filePath";
pub const ACTION_SEND_DEVICE_NAME: &str = "sendDeviceName";

/// A decoded peer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `{ "type": "filePath", "filePath": "..." }`
    DirectPath { path: PathBuf },
    /// `{ "action": "sendDeviceName", "deviceName": "..." }`
    DeviceRequest { device_name: String },
}

impl Inbound {
    /// Parse a text frame.
    ///
    /// Returns `Err` when the payload is not a JSON object and `Ok(None)` when
    /// it is a well-formed object of a shape we do not handle.
    pub fn decode(text: &str) -> Result<Option<Self>, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

        if obj.get("type").and_then(Value::as_str) == Some(TYPE_FILE_PATH) {
            if let Some(path) = obj.get("filePath").and_then(Value::as_str) {
                return Ok(Some(Inbound::DirectPath {
                    path: PathBuf::from(path),
                }));
            }
        }
        if obj.get("action").and_then(Value::as_str) == Some(ACTION_SEND_DEVICE_NAME) {
            if let Some(name) = obj.get("deviceName").and_then(Value::as_str) {
                return Ok(Some(Inbound::DeviceRequest {
                    device_name: name.to_string(),
                }));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
}

/// Replies sent to the originating peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Status {
        #[serde(rename = "type")]
        kind: StatusKind,
        message: String,
    },
    Locate(LocateReply),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum LocateReply {
    FileFound {
        #[serde(rename = "fileName")]
        file_name: String,
        directory: String,
    },
    FileNotFound {
        #[serde(rename = "fileName")]
        file_name: String,
    },
}

impl Outbound {
    pub fn success(message: impl Into<String>) -> Self {
        Outbound::Status {
            kind: StatusKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outbound::Status {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }

    pub fn file_found(file_name: &str, directory: &std::path::Path) -> Self {
        Outbound::Locate(LocateReply::FileFound {
            file_name: file_name.to_string(),
            directory: directory.display().to_string(),
        })
    }

    pub fn file_not_found(file_name: &str) -> Self {
        Outbound::Locate(LocateReply::FileNotFound {
            file_name: file_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_direct_path() {
        let msg = Inbound::decode(r#"{"type":"filePath","filePath":"/data/run"}"#).unwrap();
        assert_eq!(
            msg,
            Some(Inbound::DirectPath {
                path: PathBuf::from("/data/run")
            })
        );
    }

    #[test]
    fn decodes_device_request() {
        let msg =
            Inbound::decode(r#"{"action":"sendDeviceName","deviceName":"DEV1"}"#).unwrap();
        assert_eq!(
            msg,
            Some(Inbound::DeviceRequest {
                device_name: "DEV1".into()
            })
        );
    }

    #[test]
    fn unknown_shapes_are_not_errors() {
        assert_eq!(Inbound::decode(r#"{"hello":1}"#).unwrap(), None);
        assert_eq!(Inbound::decode(r#"{"type":"filePath"}"#).unwrap(), None);
        assert_eq!(
            Inbound::decode(r#"{"action":"other","deviceName":"x"}"#).unwrap(),
            None
        );
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        assert!(Inbound::decode("{not json").is_err());
        assert!(matches!(
            Inbound::decode("[1,2]"),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn outbound_wire_shapes() {
        let v = serde_json::to_value(Outbound::success("done")).unwrap();
        assert_eq!(v, json!({"type": "success", "message": "done"}));

        let v = serde_json::to_value(Outbound::file_found(
            "severin.exe",
            std::path::Path::new("/opt/sev"),
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"action": "fileFound", "fileName": "severin.exe", "directory": "/opt/sev"})
        );

        let v = serde_json::to_value(Outbound::file_not_found("severin.exe")).unwrap();
        assert_eq!(v, json!({"action": "fileNotFound", "fileName": "severin.exe"}));
    }
}
