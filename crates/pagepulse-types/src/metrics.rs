use std::{collections::BTreeMap, fmt};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Three-bucket quality rating shared by every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

impl Rating {
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Good => "good",
            Rating::NeedsImprovement => "needs-improvement",
            Rating::Poor => "poor",
        }
    }
}

/// Upper bounds (inclusive) of the `good` and `needs-improvement` buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub good: f64,
    pub poor: f64,
}

impl Thresholds {
    pub const fn new(good: f64, poor: f64) -> Self {
        Self { good, poor }
    }

    pub fn rate(&self, value: f64) -> Rating {
        if value > self.poor {
            Rating::Poor
        } else if value > self.good {
            Rating::NeedsImprovement
        } else {
            Rating::Good
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "FCP")]
    Fcp,
    #[serde(rename = "FMP")]
    Fmp,
    #[serde(rename = "TTI")]
    Tti,
    #[serde(rename = "PLT")]
    Plt,
    #[serde(rename = "LCP")]
    Lcp,
    #[serde(rename = "INP")]
    Inp,
    #[serde(rename = "FST")]
    Fst,
    #[serde(rename = "Resource Load Time")]
    ResourceLoadTime,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Fcp => "FCP",
            MetricKind::Fmp => "FMP",
            MetricKind::Tti => "TTI",
            MetricKind::Plt => "PLT",
            MetricKind::Lcp => "LCP",
            MetricKind::Inp => "INP",
            MetricKind::Fst => "FST",
            MetricKind::ResourceLoadTime => "Resource Load Time",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal value produced once per tracker per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub id: String,
    pub name: MetricKind,
    pub value: f64,
    pub rating: Rating,
}

impl MetricResult {
    /// Builds a result whose id is the current wall clock in epoch milliseconds.
    pub fn rated(name: MetricKind, value: f64, thresholds: Thresholds) -> Self {
        Self {
            id: Utc::now().timestamp_millis().to_string(),
            name,
            value,
            rating: thresholds.rate(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Img,
    Script,
    Stylesheet,
    Fetch,
    Xmlhttprequest,
    Link,
    Css,
    Other,
}

impl ResourceType {
    /// Uses the reported initiator first, then the URL suffix.
    pub fn classify(url: &str, initiator_type: Option<&str>) -> Self {
        match initiator_type {
            Some("img") | Some("image") => return ResourceType::Img,
            Some("script") => return ResourceType::Script,
            Some("stylesheet") => return ResourceType::Stylesheet,
            Some("fetch") => return ResourceType::Fetch,
            Some("xmlhttprequest") => return ResourceType::Xmlhttprequest,
            Some("link") => return ResourceType::Link,
            Some("css") => return ResourceType::Css,
            Some(other) if !other.is_empty() => return ResourceType::Other,
            _ => {}
        }
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if path.ends_with(".js") {
            ResourceType::Script
        } else if path.ends_with(".css") {
            ResourceType::Stylesheet
        } else if [".jpg", ".jpeg", ".png", ".gif", ".webp"]
            .iter()
            .any(|ext| path.ends_with(ext))
        {
            ResourceType::Img
        } else {
            ResourceType::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetric {
    #[serde(flatten)]
    pub metric: MetricResult,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

/// Aggregated view emitted once every core tracker has reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub values: BTreeMap<MetricKind, f64>,
    pub resources: Vec<ResourceMetric>,
    #[serde(default)]
    pub fallback: bool,
}

impl MetricsSummary {
    pub fn record(&mut self, metric: &MetricResult) {
        self.values.insert(metric.name, metric.value);
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.values.get(&kind).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_buckets_are_inclusive_upper_bounds() {
        let thresholds = Thresholds::new(2_500.0, 3_200.0);
        assert_eq!(thresholds.rate(500.0), Rating::Good);
        assert_eq!(thresholds.rate(2_500.0), Rating::Good);
        assert_eq!(thresholds.rate(2_500.1), Rating::NeedsImprovement);
        assert_eq!(thresholds.rate(3_200.0), Rating::NeedsImprovement);
        assert_eq!(thresholds.rate(3_200.1), Rating::Poor);
    }

    #[test]
    fn rating_serializes_kebab_case() {
        let json = serde_json::to_string(&Rating::NeedsImprovement).expect("serialize rating");
        assert_eq!(json, "\"needs-improvement\"");
    }

    #[test]
    fn resource_type_prefers_initiator() {
        assert_eq!(
            ResourceType::classify("https://cdn.test/app.js", Some("img")),
            ResourceType::Img
        );
        assert_eq!(
            ResourceType::classify("https://cdn.test/app.js?v=3", None),
            ResourceType::Script
        );
        assert_eq!(
            ResourceType::classify("https://cdn.test/hero.WEBP", Some("")),
            ResourceType::Img
        );
        assert_eq!(
            ResourceType::classify("https://api.test/items", None),
            ResourceType::Other
        );
    }

    #[test]
    fn metric_id_is_epoch_millis() {
        let metric = MetricResult::rated(MetricKind::Tti, 500.0, Thresholds::new(2_500.0, 3_200.0));
        assert!(metric.id.parse::<i64>().expect("numeric id") > 0);
        assert_eq!(metric.rating, Rating::Good);
    }
}
