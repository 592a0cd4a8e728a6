//! Serde models for the OTLP JSON metrics envelope.
//!
//! Only the slice of the protocol this service consumes is modeled:
//! resource attributes plus sum-metric data points. Every field defaults
//! so partially-populated envelopes from third-party exporters still
//! parse; unknown fields are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsEnvelope {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetrics {
    pub resource: Option<Resource>,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AnyValue {
    pub string_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeMetrics {
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Metric {
    pub name: String,
    pub sum: Option<Sum>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberDataPoint {
    /// OTLP JSON encodes 64-bit integers as strings; many exporters emit
    /// plain numbers. Both are accepted.
    #[serde(deserialize_with = "int_or_string")]
    #[schema(value_type = Option<i64>)]
    pub as_int: Option<i64>,
    pub attributes: Vec<KeyValue>,
}

impl MetricsEnvelope {
    /// String value of a resource attribute on the first batch, where the
    /// reporting agent places its identity.
    pub fn resource_attribute(&self, key: &str) -> Option<&str> {
        self.resource_metrics
            .first()?
            .resource
            .as_ref()?
            .attributes
            .iter()
            .find(|attr| attr.key == key)?
            .value
            .string_value
            .as_deref()
    }
}

impl NumberDataPoint {
    pub fn value(&self) -> i64 {
        self.as_int.unwrap_or(0)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .and_then(|attr| attr.value.string_value.as_deref())
    }
}

fn int_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrString::Int(value)) => Ok(Some(value)),
        Some(IntOrString::Str(value)) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
