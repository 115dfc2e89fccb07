//! Platform capability layer: the host interfaces every tracker observes.

use std::sync::Arc;

use pagepulse_types::{
    config::PulseConfig,
    entries::{EntryFilter, EntryType, NavigationTiming, PerformanceEntry},
    layout::{NodeHandle, Rect, Viewport},
    PulseError, Result,
};

pub mod lifecycle;
pub mod mutation;
pub mod scenario;
pub mod simulated;
pub mod subscription;

pub use lifecycle::{lifecycle_channel, LifecycleController, PageLifecycle};
pub use mutation::{MutationKind, MutationObserverInit, MutationRecord};
pub use simulated::{ElementSpec, SimulatedPage, SimulatedPageConfig};
pub use subscription::{subscription_channel, BatchSender, Subscription};

pub type EntrySubscription = Subscription<Vec<PerformanceEntry>>;
pub type MutationSubscription = Subscription<Vec<MutationRecord>>;

/// Timestamped performance entries (paint, LCP, long tasks, resources, events).
pub trait PerformanceTimeline: Send + Sync {
    fn supports_observer(&self) -> bool;
    /// `buffered` replays matching entries recorded before the call.
    fn observe(&self, filter: EntryFilter, buffered: bool) -> Result<EntrySubscription>;
    fn entries_by_type(&self, entry_type: EntryType) -> Vec<PerformanceEntry>;
}

pub trait MutationSource: Send + Sync {
    fn observe_mutations(&self, init: MutationObserverInit) -> Result<MutationSubscription>;
}

/// Read-only geometry and style queries over the live document.
pub trait DocumentLayout: Send + Sync {
    fn body(&self) -> Option<NodeHandle>;
    /// `None` entries stand for children that vanished between queries.
    fn children(&self, node: NodeHandle) -> Vec<Option<NodeHandle>>;
    fn tag_name(&self, node: NodeHandle) -> String;
    fn bounding_rect(&self, node: NodeHandle) -> Rect;
    /// Computed `background-image`; `None` or `"none"` when absent.
    fn background_image(&self, node: NodeHandle) -> Option<String>;
    fn viewport(&self) -> Viewport;
}

pub trait NavigationTimingSource: Send + Sync {
    /// `None` when the host exposes no navigation timing at all.
    fn navigation_timing(&self) -> Option<NavigationTiming>;
}

/// Monotonic milliseconds since navigation start.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The capability objects a session is assembled from.
#[derive(Clone)]
pub struct PageHost {
    pub timeline: Arc<dyn PerformanceTimeline>,
    pub mutations: Arc<dyn MutationSource>,
    pub document: Arc<dyn DocumentLayout>,
    pub navigation: Arc<dyn NavigationTimingSource>,
    pub clock: Arc<dyn Clock>,
}

/// Explicit context for one page session, handed to every tracker.
#[derive(Clone)]
pub struct PageSession {
    host: PageHost,
    lifecycle: PageLifecycle,
    config: Arc<PulseConfig>,
}

impl PageSession {
    pub fn new(host: PageHost, lifecycle: PageLifecycle, config: PulseConfig) -> Self {
        Self {
            host,
            lifecycle,
            config: Arc::new(config),
        }
    }

    pub fn timeline(&self) -> &dyn PerformanceTimeline {
        self.host.timeline.as_ref()
    }

    pub fn mutations(&self) -> &dyn MutationSource {
        self.host.mutations.as_ref()
    }

    pub fn document(&self) -> &dyn DocumentLayout {
        self.host.document.as_ref()
    }

    pub fn navigation_timing(&self) -> Option<NavigationTiming> {
        self.host.navigation.navigation_timing()
    }

    pub fn now(&self) -> f64 {
        self.host.clock.now()
    }

    pub fn lifecycle(&self) -> &PageLifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }
}

/// Generate an error aligned with page host semantics.
pub fn page_error(message: impl Into<String>) -> PulseError {
    PulseError::Subscription(message.into())
}

/// Error for a capability the host does not provide.
pub fn capability_error(message: impl Into<String>) -> PulseError {
    PulseError::Capability(message.into())
}
