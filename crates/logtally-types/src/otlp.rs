//! OTLP/JSON log export model.
//!
//! These types mirror the JSON encoding of the `OpenTelemetry`
//! `ExportLogsServiceRequest` as sent to `POST /v1/logs`. Only the parts
//! the ingress needs are modelled; unknown fields are ignored on decode.
//!
//! Attribute values use the protobuf JSON mapping: exactly one of
//! `stringValue`, `boolValue`, `intValue`, `doubleValue`, `bytesValue`,
//! `arrayValue` or `kvlistValue` is set. `intValue` is accepted both as a
//! JSON number and as a decimal string, `bytesValue` is standard base64.
//! An empty object (`{}`) decodes to [`AnyValue::Unset`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnyValue", into = "RawAnyValue")]
pub enum AnyValue {
    /// UTF-8 string.
    String(String),
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE 754 double.
    Double(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<AnyValue>),
    /// Nested key/value list.
    KvList(Vec<KeyValue>),
    /// The value object was present but carried no variant.
    Unset,
}

impl AnyValue {
    /// Convenience constructor for a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AnyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AnyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AnyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AnyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Wire shape of [`AnyValue`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnyValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bool_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    int_value: Option<JsonInt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bytes_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array_value: Option<ArrayValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kvlist_value: Option<KeyValueList>,
}

/// int64 fields may arrive as a JSON number or as a decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonInt {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArrayValue {
    #[serde(default)]
    values: Vec<AnyValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeyValueList {
    #[serde(default)]
    values: Vec<KeyValue>,
}

impl TryFrom<RawAnyValue> for AnyValue {
    type Error = String;

    fn try_from(raw: RawAnyValue) -> Result<Self, Self::Error> {
        if let Some(s) = raw.string_value {
            return Ok(Self::String(s));
        }
        if let Some(b) = raw.bool_value {
            return Ok(Self::Bool(b));
        }
        if let Some(i) = raw.int_value {
            return match i {
                JsonInt::Number(n) => Ok(Self::Int(n)),
                JsonInt::Text(text) => text
                    .parse::<i64>()
                    .map(Self::Int)
                    .map_err(|e| format!("invalid intValue {text:?}: {e}")),
            };
        }
        if let Some(d) = raw.double_value {
            return Ok(Self::Double(d));
        }
        if let Some(encoded) = raw.bytes_value {
            return STANDARD
                .decode(encoded.as_bytes())
                .map(Self::Bytes)
                .map_err(|e| format!("invalid base64 bytesValue: {e}"));
        }
        if let Some(array) = raw.array_value {
            return Ok(Self::Array(array.values));
        }
        if let Some(list) = raw.kvlist_value {
            return Ok(Self::KvList(list.values));
        }
        Ok(Self::Unset)
    }
}

impl From<AnyValue> for RawAnyValue {
    fn from(value: AnyValue) -> Self {
        let mut raw = Self::default();
        match value {
            AnyValue::String(s) => raw.string_value = Some(s),
            AnyValue::Bool(b) => raw.bool_value = Some(b),
            AnyValue::Int(i) => raw.int_value = Some(JsonInt::Text(i.to_string())),
            AnyValue::Double(d) => raw.double_value = Some(d),
            AnyValue::Bytes(bytes) => raw.bytes_value = Some(STANDARD.encode(bytes)),
            AnyValue::Array(values) => raw.array_value = Some(ArrayValue { values }),
            AnyValue::KvList(values) => raw.kvlist_value = Some(KeyValueList { values }),
            AnyValue::Unset => {}
        }
        raw
    }
}

/// One attribute: a key and an optional typed value.
///
/// A `null` or missing `value` decodes to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Attribute name.
    pub key: String,
    /// Attribute value, if one was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnyValue>,
}

impl KeyValue {
    /// Build an attribute with a value.
    pub fn new(key: impl Into<String>, value: impl Into<AnyValue>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Build an attribute whose value is absent.
    pub fn without_value(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Export request
// ---------------------------------------------------------------------------

/// Body of `POST /v1/logs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsServiceRequest {
    /// Log records grouped by the resource that produced them.
    #[serde(default)]
    pub resource_logs: Vec<ResourceLogs>,
}

impl ExportLogsServiceRequest {
    /// Total number of log records across all resources and scopes.
    pub fn record_count(&self) -> usize {
        self.resource_logs
            .iter()
            .flat_map(|rl| rl.scope_logs.iter())
            .map(|sl| sl.log_records.len())
            .fold(0_usize, usize::saturating_add)
    }
}

/// Records emitted by one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    /// The emitting resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    /// Records grouped by instrumentation scope.
    #[serde(default)]
    pub scope_logs: Vec<ScopeLogs>,
}

impl ResourceLogs {
    /// Resource-level attributes, empty when no resource was sent.
    pub fn resource_attributes(&self) -> &[KeyValue] {
        self.resource
            .as_ref()
            .map(|resource| resource.attributes.as_slice())
            .unwrap_or_default()
    }
}

/// The entity producing telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource attributes.
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

/// Records emitted through one instrumentation scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    /// The instrumentation scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<InstrumentationScope>,
    /// The log records.
    #[serde(default)]
    pub log_records: Vec<LogRecord>,
}

impl ScopeLogs {
    /// Scope-level attributes, empty when no scope was sent.
    pub fn scope_attributes(&self) -> &[KeyValue] {
        self.scope
            .as_ref()
            .map(|scope| scope.attributes.as_slice())
            .unwrap_or_default()
    }
}

/// Instrumentation library identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentationScope {
    /// Scope name.
    #[serde(default)]
    pub name: String,
    /// Scope version.
    #[serde(default)]
    pub version: String,
    /// Scope attributes.
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

/// Nanoseconds since the Unix epoch.
///
/// Encoded as a decimal string; a JSON number is also accepted on decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "JsonUint", into = "String")]
pub struct UnixNanos(pub u64);

impl TryFrom<JsonUint> for UnixNanos {
    type Error = String;

    fn try_from(raw: JsonUint) -> Result<Self, Self::Error> {
        match raw {
            JsonUint::Number(n) => Ok(Self(n)),
            JsonUint::Text(text) => text
                .parse::<u64>()
                .map(Self)
                .map_err(|e| format!("invalid timeUnixNano {text:?}: {e}")),
        }
    }
}

impl From<UnixNanos> for String {
    fn from(nanos: UnixNanos) -> Self {
        nanos.0.to_string()
    }
}

/// fixed64 fields, same dual encoding as `JsonInt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum JsonUint {
    Number(u64),
    Text(String),
}

/// A single log record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// When the event occurred. Absent or zero means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unix_nano: Option<UnixNanos>,
    /// Severity as text (`INFO`, `WARN`, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity_text: String,
    /// Record body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<AnyValue>,
    /// Record-level attributes.
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

// ---------------------------------------------------------------------------
// Export response
// ---------------------------------------------------------------------------

/// Response to `POST /v1/logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsServiceResponse {
    /// Present only when some records were rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_success: Option<ExportLogsPartialSuccess>,
}

/// Details about rejected records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsPartialSuccess {
    /// Number of records the server did not accept.
    pub rejected_log_records: u64,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(value: serde_json::Value) -> AnyValue {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_scalar_variants() {
        assert_eq!(decode(json!({"stringValue": "x"})), AnyValue::string("x"));
        assert_eq!(decode(json!({"boolValue": true})), AnyValue::Bool(true));
        assert_eq!(decode(json!({"intValue": "42"})), AnyValue::Int(42));
        assert_eq!(decode(json!({"intValue": -7})), AnyValue::Int(-7));
        assert_eq!(decode(json!({"doubleValue": 1.5})), AnyValue::Double(1.5));
        assert_eq!(
            decode(json!({"bytesValue": "aGk="})),
            AnyValue::Bytes(b"hi".to_vec())
        );
    }

    #[test]
    fn decodes_composites_and_unset() {
        assert_eq!(
            decode(json!({"arrayValue": {"values": [{"stringValue": "a"}]}})),
            AnyValue::Array(vec![AnyValue::string("a")])
        );
        assert_eq!(
            decode(json!({"kvlistValue": {"values": [{"key": "k", "value": {"boolValue": false}}]}})),
            AnyValue::KvList(vec![KeyValue::new("k", false)])
        );
        assert_eq!(decode(json!({})), AnyValue::Unset);
    }

    #[test]
    fn rejects_malformed_int_and_bytes() {
        assert!(serde_json::from_value::<AnyValue>(json!({"intValue": "4x"})).is_err());
        assert!(serde_json::from_value::<AnyValue>(json!({"bytesValue": "%%%"})).is_err());
    }

    #[test]
    fn int_serializes_as_decimal_string() {
        let json = serde_json::to_value(AnyValue::Int(9)).unwrap();
        assert_eq!(json, json!({"intValue": "9"}));
    }

    #[test]
    fn null_value_is_absent() {
        let kv: KeyValue = serde_json::from_value(json!({"key": "foo", "value": null})).unwrap();
        assert_eq!(kv, KeyValue::without_value("foo"));
        let kv: KeyValue = serde_json::from_value(json!({"key": "foo"})).unwrap();
        assert!(kv.value.is_none());
    }

    #[test]
    fn decodes_full_request_and_counts_records() {
        let body = json!({
            "resourceLogs": [{
                "resource": {"attributes": [{"key": "service.name", "value": {"stringValue": "api"}}]},
                "scopeLogs": [
                    {
                        "scope": {"name": "lib", "attributes": [{"key": "foo", "value": {"stringValue": "s"}}]},
                        "logRecords": [
                            {"severityText": "INFO", "body": {"stringValue": "hello"}},
                            {"attributes": [{"key": "foo", "value": {"stringValue": "r"}}]}
                        ]
                    },
                    {"logRecords": [{}]}
                ]
            }]
        });
        let req: ExportLogsServiceRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.record_count(), 3);

        let rl = req.resource_logs.first().unwrap();
        assert_eq!(rl.resource_attributes().len(), 1);
        assert_eq!(rl.scope_logs.first().unwrap().scope_attributes().len(), 1);
        assert!(rl.scope_logs.get(1).unwrap().scope_attributes().is_empty());
    }

    #[test]
    fn time_unix_nano_accepts_string_and_number() {
        let record: LogRecord =
            serde_json::from_value(json!({"timeUnixNano": "1700000000000000000"})).unwrap();
        assert_eq!(record.time_unix_nano, Some(UnixNanos(1_700_000_000_000_000_000)));

        let record: LogRecord = serde_json::from_value(json!({"timeUnixNano": 42})).unwrap();
        assert_eq!(record.time_unix_nano, Some(UnixNanos(42)));

        let record: LogRecord = serde_json::from_value(json!({})).unwrap();
        assert!(record.time_unix_nano.is_none());

        assert!(serde_json::from_value::<LogRecord>(json!({"timeUnixNano": "-1"})).is_err());
        assert!(serde_json::from_value::<LogRecord>(json!({"timeUnixNano": "soon"})).is_err());
    }

    #[test]
    fn time_unix_nano_serializes_as_decimal_string() {
        let record = LogRecord {
            time_unix_nano: Some(UnixNanos(18_446_744_073_709_551_615)),
            ..LogRecord::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timeUnixNano"], "18446744073709551615");
        assert!(serde_json::to_value(LogRecord::default()).unwrap().get("timeUnixNano").is_none());
    }

    #[test]
    fn response_omits_partial_success_when_absent() {
        let ok = serde_json::to_value(ExportLogsServiceResponse::default()).unwrap();
        assert_eq!(ok, json!({}));

        let partial = ExportLogsServiceResponse {
            partial_success: Some(ExportLogsPartialSuccess {
                rejected_log_records: 5,
                error_message: String::from("queue full"),
            }),
        };
        let json = serde_json::to_value(partial).unwrap();
        assert_eq!(json["partialSuccess"]["rejectedLogRecords"], 5);
        assert_eq!(json["partialSuccess"]["errorMessage"], "queue full");
    }
}
