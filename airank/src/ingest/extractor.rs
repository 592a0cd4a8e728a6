//! Folds an OTLP envelope into one normalized usage event.

use super::otlp::MetricsEnvelope;
use crate::db::UsageDeltas;
use tracing::warn;

/// Name of the cumulative-sum metric carrying token counts. Vendor
/// prefixes (`<vendor>.token.usage`) are accepted as the same metric.
pub const TOKEN_USAGE_METRIC: &str = "token.usage";

/// Data-point attribute distinguishing token categories.
pub const TOKEN_TYPE_ATTRIBUTE: &str = "token_type";

/// One normalized batch of token deltas extracted from a telemetry
/// submission. All counts are non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageEvent {
    pub input: i64,
    pub output: i64,
    pub cache_read: i64,
    pub cache_write: i64,
    /// Tokens whose `token_type` attribute was missing or unrecognized:
    /// counted toward totals, attributed to no category.
    pub unattributed: i64,
}

impl UsageEvent {
    /// Grand total across every qualifying data point, cache categories
    /// included. Echoed to the reporter, logged per event, and used for
    /// the volatile window scores and throughput tracking.
    pub fn total_tokens(&self) -> i64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_write)
            .saturating_add(self.unattributed)
    }

    /// Ranking total: input + output (+ unattributed), cache categories
    /// excluded. The durable `total_tokens` counter advances by this.
    pub fn ranking_total(&self) -> i64 {
        self.input.saturating_add(self.output).saturating_add(self.unattributed)
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0
    }

    /// The atomic counter increment this event maps to.
    pub fn deltas(&self) -> UsageDeltas {
        UsageDeltas {
            input: self.input,
            output: self.output,
            cache_read: self.cache_read,
            cache_write: self.cache_write,
            total: self.ranking_total(),
        }
    }
}

fn is_token_usage_metric(name: &str) -> bool {
    name == TOKEN_USAGE_METRIC || name.ends_with(".token.usage")
}

/// Sum every qualifying data point across the envelope.
///
/// Metrics other than `token.usage` are ignored without error; so are
/// sum-less metric entries. Negative values are clamped to zero. A data
/// point with an unknown `token_type` is an anomaly worth a warning, not
/// a reason to reject the batch.
pub fn extract(envelope: &MetricsEnvelope) -> UsageEvent {
    let mut event = UsageEvent::default();

    for resource_metrics in &envelope.resource_metrics {
        for scope_metrics in &resource_metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                if !is_token_usage_metric(&metric.name) {
                    continue;
                }
                let Some(sum) = &metric.sum else { continue };

                for point in &sum.data_points {
                    let value = point.value().max(0);
                    match point.attribute(TOKEN_TYPE_ATTRIBUTE) {
                        Some("input") => event.input = event.input.saturating_add(value),
                        Some("output") => event.output = event.output.saturating_add(value),
                        Some("cache_read") => event.cache_read = event.cache_read.saturating_add(value),
                        Some("cache_write") => event.cache_write = event.cache_write.saturating_add(value),
                        other => {
                            if value > 0 {
                                warn!(token_type = ?other, tokens = value, "unrecognized token_type attribute, counting toward total only");
                            }
                            event.unattributed = event.unattributed.saturating_add(value);
                        }
                    }
                }
            }
        }
    }

    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> MetricsEnvelope {
        serde_json::from_value(value).unwrap()
    }

    fn data_point(token_type: &str, value: i64) -> serde_json::Value {
        json!({
            "asInt": value,
            "attributes": [{"key": "token_type", "value": {"stringValue": token_type}}]
        })
    }

    fn usage_envelope(points: Vec<serde_json::Value>) -> MetricsEnvelope {
        envelope(json!({
            "resourceMetrics": [{
                "scopeMetrics": [{
                    "metrics": [{"name": "token.usage", "sum": {"dataPoints": points}}]
                }]
            }]
        }))
    }

    #[test]
    fn test_extract_sums_by_category() {
        let event = extract(&usage_envelope(vec![
            data_point("input", 80),
            data_point("output", 40),
            data_point("cache_read", 20),
            data_point("cache_write", 10),
            data_point("input", 20),
        ]));

        assert_eq!(event.input, 100);
        assert_eq!(event.output, 40);
        assert_eq!(event.cache_read, 20);
        assert_eq!(event.cache_write, 10);
        assert_eq!(event.total_tokens(), 170);
        assert_eq!(event.ranking_total(), 140);
    }

    #[test]
    fn test_unrecognized_token_type_counts_toward_total_only() {
        let event = extract(&usage_envelope(vec![
            data_point("input", 50),
            data_point("speculative", 30),
        ]));

        assert_eq!(event.input, 50);
        assert_eq!(event.unattributed, 30);
        assert_eq!(event.total_tokens(), 80);
        assert_eq!(event.ranking_total(), 80);
    }

    #[test]
    fn test_missing_token_type_is_unattributed() {
        let event = extract(&usage_envelope(vec![json!({"asInt": 12})]));

        assert_eq!(event.unattributed, 12);
        assert_eq!(event.total_tokens(), 12);
    }

    #[test]
    fn test_other_metrics_are_ignored() {
        let event = extract(&envelope(json!({
            "resourceMetrics": [{
                "scopeMetrics": [{
                    "metrics": [
                        {"name": "session.count", "sum": {"dataPoints": [{"asInt": 99}]}},
                        {"name": "token.usage", "sum": {"dataPoints": [data_point("output", 5)]}}
                    ]
                }]
            }]
        })));

        assert_eq!(event.output, 5);
        assert_eq!(event.total_tokens(), 5);
    }

    #[test]
    fn test_vendor_prefixed_metric_name_qualifies() {
        let event = extract(&envelope(json!({
            "resourceMetrics": [{
                "scopeMetrics": [{
                    "metrics": [{"name": "claude_code.token.usage", "sum": {"dataPoints": [data_point("input", 7)]}}]
                }]
            }]
        })));

        assert_eq!(event.input, 7);
    }

    #[test]
    fn test_empty_envelope_is_a_no_op() {
        let event = extract(&envelope(json!({"resourceMetrics": []})));
        assert!(event.is_empty());
    }

    #[test]
    fn test_gauge_only_metric_contributes_nothing() {
        // A token.usage entry without a sum body is skipped.
        let event = extract(&envelope(json!({
            "resourceMetrics": [{
                "scopeMetrics": [{
                    "metrics": [{"name": "token.usage", "gauge": {"dataPoints": [{"asInt": 11}]}}]
                }]
            }]
        })));
        assert!(event.is_empty());
    }

    #[test]
    fn test_negative_values_are_clamped() {
        let event = extract(&usage_envelope(vec![data_point("input", -5)]));
        assert!(event.is_empty());
    }

    #[test]
    fn test_sums_across_multiple_resources() {
        let event = extract(&envelope(json!({
            "resourceMetrics": [
                {"scopeMetrics": [{"metrics": [{"name": "token.usage", "sum": {"dataPoints": [data_point("input", 3)]}}]}]},
                {"scopeMetrics": [{"metrics": [{"name": "token.usage", "sum": {"dataPoints": [data_point("input", 4)]}}]}]}
            ]
        })));
        assert_eq!(event.input, 7);
    }

    #[test]
    fn test_deltas_exclude_cache_from_ranking_total() {
        let event = UsageEvent {
            input: 10,
            output: 5,
            cache_read: 100,
            cache_write: 50,
            unattributed: 2,
        };
        let deltas = event.deltas();

        assert_eq!(deltas.total, 17);
        assert_eq!(deltas.cache_read, 100);
        assert_eq!(deltas.cache_write, 50);
    }
}
