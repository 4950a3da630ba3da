//! Model construction settings.

use serde::{Deserialize, Serialize};

/// How a [`Model`](super::Model) is set up.
///
/// ```
/// use json_crdt_engine::ModelOptions;
///
/// let opts: ModelOptions = serde_json::from_str(r#"{"sid": 70000}"#).unwrap();
/// assert_eq!(opts.sid, Some(70000));
/// assert!(opts.extensions);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Session id; a random one is drawn when absent.
    pub sid: Option<u64>,
    /// When set, the model uses a server clock starting at this time and
    /// `sid` is ignored.
    pub server_time: Option<u64>,
    /// Register the built-in `cnt` and `mval` extensions.
    pub extensions: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            sid: None,
            server_time: None,
            extensions: true,
        }
    }
}

impl ModelOptions {
    pub fn with_sid(sid: u64) -> Self {
        Self {
            sid: Some(sid),
            ..Self::default()
        }
    }

    pub fn server(time: u64) -> Self {
        Self {
            server_time: Some(time),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let opts: ModelOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(opts, ModelOptions::default());
        assert!(opts.extensions);
    }

    #[test]
    fn serializes_every_field() {
        let value = serde_json::to_value(ModelOptions::server(10)).unwrap();
        assert_eq!(value, json!({"sid": null, "server_time": 10, "extensions": true}));
        let back: ModelOptions = serde_json::from_value(value).unwrap();
        assert_eq!(back.server_time, Some(10));
    }
}
