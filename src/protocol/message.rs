use serde::{Deserialize, Serialize};

/// Payload of every response frame.
///
/// A non-empty `error` means the call failed and `result` must be ignored.
/// Field names match the JSON emitted by other implementations of the
/// protocol (`{"Error": ..., "Result": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage<T> {
    #[serde(rename = "Error")]
    pub error: Option<String>,
    #[serde(rename = "Result")]
    pub result: Option<T>,
}

impl<T> ResponseMessage<T> {
    pub fn success(result: T) -> Self {
        Self {
            error: None,
            result: Some(result),
        }
    }

    /// Whether the message reports a failed call
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Split into the error text or the (possibly absent) result
    pub fn into_outcome(self) -> Result<Option<T>, String> {
        match self.error {
            Some(e) if !e.is_empty() => Err(e),
            _ => Ok(self.result),
        }
    }
}

impl ResponseMessage<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serialization::SerializationFormat;

    #[test]
    fn empty_error_string_is_success() {
        let msg: ResponseMessage<u8> = ResponseMessage {
            error: Some(String::new()),
            result: Some(3),
        };
        assert!(!msg.is_error());
        assert_eq!(msg.into_outcome(), Ok(Some(3)));
    }

    #[test]
    fn json_field_names() {
        let json = serde_json::to_string(&ResponseMessage::success(5)).unwrap();
        assert_eq!(json, r#"{"Error":null,"Result":5}"#);

        let decoded: ResponseMessage<i32> =
            serde_json::from_str(r#"{"Error":"","Result":1}"#).unwrap();
        assert!(!decoded.is_error());
        assert_eq!(decoded.result, Some(1));
    }

    #[test]
    fn failure_decodes_as_any_result_type() {
        for format in [SerializationFormat::Json, SerializationFormat::Bincode] {
            let bytes = format
                .encode(&ResponseMessage::failure("division by zero"))
                .unwrap();
            let decoded: ResponseMessage<(i64, String)> = format.decode(&bytes).unwrap();
            assert_eq!(decoded.into_outcome(), Err("division by zero".to_string()));
        }
    }
}
