use serde::{Deserialize, Serialize};

pub const FIRST_PAINT: &str = "first-paint";
pub const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

/// Entry types delivered by the performance timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "paint")]
    Paint,
    #[serde(rename = "largest-contentful-paint")]
    LargestContentfulPaint,
    #[serde(rename = "longtask")]
    LongTask,
    #[serde(rename = "resource")]
    Resource,
    #[serde(rename = "event")]
    Event,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Paint => "paint",
            EntryType::LargestContentfulPaint => "largest-contentful-paint",
            EntryType::LongTask => "longtask",
            EntryType::Resource => "resource",
            EntryType::Event => "event",
        }
    }
}

/// A timestamped record as delivered by the platform observer.
///
/// All times are milliseconds relative to navigation start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<u64>,
}

impl PerformanceEntry {
    fn base(name: impl Into<String>, entry_type: EntryType, start_time: f64, duration: f64) -> Self {
        Self {
            name: name.into(),
            entry_type,
            start_time,
            duration,
            response_end: None,
            initiator_type: None,
            interaction_id: None,
        }
    }

    pub fn paint(name: impl Into<String>, start_time: f64) -> Self {
        Self::base(name, EntryType::Paint, start_time, 0.0)
    }

    pub fn largest_contentful_paint(start_time: f64) -> Self {
        Self::base("", EntryType::LargestContentfulPaint, start_time, 0.0)
    }

    pub fn long_task(start_time: f64, duration: f64) -> Self {
        Self::base("self", EntryType::LongTask, start_time, duration)
    }

    pub fn resource(
        url: impl Into<String>,
        start_time: f64,
        response_end: f64,
        initiator_type: Option<String>,
    ) -> Self {
        let mut entry = Self::base(url, EntryType::Resource, start_time, response_end - start_time);
        entry.response_end = Some(response_end);
        entry.initiator_type = initiator_type;
        entry
    }

    pub fn interaction(
        name: impl Into<String>,
        start_time: f64,
        duration: f64,
        interaction_id: u64,
    ) -> Self {
        let mut entry = Self::base(name, EntryType::Event, start_time, duration);
        entry.interaction_id = Some(interaction_id);
        entry
    }

    pub fn response_end_or_duration(&self) -> f64 {
        self.response_end
            .unwrap_or(self.start_time + self.duration)
    }
}

/// Selects which entry types a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    pub types: Vec<EntryType>,
}

impl EntryFilter {
    pub fn single(entry_type: EntryType) -> Self {
        Self {
            types: vec![entry_type],
        }
    }

    pub fn of(types: &[EntryType]) -> Self {
        Self {
            types: types.to_vec(),
        }
    }

    pub fn matches(&self, entry: &PerformanceEntry) -> bool {
        self.types.contains(&entry.entry_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LongTaskEntry {
    pub start_time: f64,
    pub duration: f64,
}

impl LongTaskEntry {
    pub fn new(start_time: f64, duration: f64) -> Self {
        Self {
            start_time,
            duration,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

impl From<&PerformanceEntry> for LongTaskEntry {
    fn from(entry: &PerformanceEntry) -> Self {
        Self::new(entry.start_time, entry.duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequestEntry {
    pub start_time: f64,
    pub response_end: f64,
}

impl NetworkRequestEntry {
    pub fn new(start_time: f64, response_end: f64) -> Self {
        Self {
            start_time,
            response_end,
        }
    }

    /// True when the request is in flight at any point of `[start, end)`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start_time < end && self.response_end > start
    }
}

impl From<&PerformanceEntry> for NetworkRequestEntry {
    fn from(entry: &PerformanceEntry) -> Self {
        Self::new(entry.start_time, entry.response_end_or_duration())
    }
}

/// Navigation timing marks as absolute timestamps; `0.0` means "not reached yet".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationTiming {
    pub navigation_start: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
}

impl NavigationTiming {
    fn relative(&self, mark: f64) -> Option<f64> {
        (mark > 0.0).then(|| mark - self.navigation_start)
    }

    pub fn dom_interactive_offset(&self) -> Option<f64> {
        self.relative(self.dom_interactive)
    }

    pub fn dom_content_loaded_offset(&self) -> Option<f64> {
        self.relative(self.dom_content_loaded_event_end)
    }

    pub fn load_offset(&self) -> Option<f64> {
        self.relative(self.load_event_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_selected_types_only() {
        let filter = EntryFilter::of(&[EntryType::LongTask, EntryType::Resource]);
        assert!(filter.matches(&PerformanceEntry::long_task(10.0, 60.0)));
        assert!(filter.matches(&PerformanceEntry::resource("a.js", 0.0, 20.0, None)));
        assert!(!filter.matches(&PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 5.0)));
    }

    #[test]
    fn request_overlap_is_half_open() {
        let request = NetworkRequestEntry::new(100.0, 200.0);
        assert!(request.overlaps(150.0, 400.0));
        assert!(!request.overlaps(200.0, 400.0));
        assert!(!request.overlaps(0.0, 100.0));
    }

    #[test]
    fn unreached_marks_have_no_offset() {
        let timing = NavigationTiming {
            navigation_start: 1_000.0,
            dom_interactive: 0.0,
            dom_content_loaded_event_end: 2_500.0,
            load_event_end: 0.0,
        };
        assert_eq!(timing.dom_content_loaded_offset(), Some(1_500.0));
        assert_eq!(timing.dom_interactive_offset(), None);
        assert_eq!(timing.load_offset(), None);
    }
}
