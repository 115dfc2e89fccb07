use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use chrono::Utc;
use pagepulse_types::{
    config::PulseConfig,
    entries::{EntryFilter, EntryType, NavigationTiming, PerformanceEntry},
    layout::{NodeHandle, Rect, Viewport},
    PulseError, Result,
};
use tokio::time::Instant;
use tracing::debug;

use crate::{
    capability_error, lifecycle_channel, page_error, subscription_channel, BatchSender, Clock,
    DocumentLayout, EntrySubscription, LifecycleController, MutationObserverInit, MutationRecord,
    MutationSource, MutationSubscription, NavigationTimingSource, PageHost, PageLifecycle,
    PageSession, PerformanceTimeline,
};

#[derive(Debug, Clone)]
pub struct SimulatedPageConfig {
    pub viewport: Viewport,
    pub supports_observer: bool,
    pub supports_navigation_timing: bool,
    /// Absolute epoch milliseconds of navigation start.
    pub navigation_start: f64,
    /// Defaults to the full viewport.
    pub body_rect: Option<Rect>,
}

impl Default for SimulatedPageConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            supports_observer: true,
            supports_navigation_timing: true,
            navigation_start: Utc::now().timestamp_millis() as f64,
            body_rect: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub tag: String,
    pub rect: Rect,
    pub background_image: Option<String>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>, rect: Rect) -> Self {
        Self {
            tag: tag.into(),
            rect,
            background_image: None,
        }
    }

    pub fn with_background(mut self, image: impl Into<String>) -> Self {
        self.background_image = Some(image.into());
        self
    }
}

#[derive(Debug, Clone)]
struct DomNode {
    tag: String,
    rect: Rect,
    background_image: Option<String>,
    text: String,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

/// Arena-backed element tree rooted at `BODY`.
#[derive(Debug)]
pub struct DomTree {
    nodes: HashMap<NodeHandle, DomNode>,
    body: NodeHandle,
    next_id: u64,
}

impl DomTree {
    fn new(body_rect: Rect) -> Self {
        let body = NodeHandle(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            body,
            DomNode {
                tag: "BODY".into(),
                rect: body_rect,
                background_image: None,
                text: String::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            body,
            next_id: 2,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    fn is_inclusive_descendant(&self, node: NodeHandle, ancestor: NodeHandle) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        false
    }

    fn node_mut(&mut self, node: NodeHandle) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(&node)
            .ok_or_else(|| simulation_error(format!("unknown node {:?}", node)))
    }

    fn detach_subtree(&mut self, node: NodeHandle) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&current) {
                stack.extend(removed.children);
            }
        }
    }
}

/// Mutable DOM view passed to [`SimulatedPage::mutate`]; every change becomes a record
/// of the batch delivered to mutation observers.
pub struct DomMutator<'a> {
    tree: &'a mut DomTree,
    records: Vec<MutationRecord>,
}

impl DomMutator<'_> {
    pub fn body(&self) -> NodeHandle {
        self.tree.body
    }

    pub fn append(&mut self, parent: NodeHandle, spec: ElementSpec) -> Result<NodeHandle> {
        let handle = NodeHandle(self.tree.next_id);
        self.tree.node_mut(parent)?.children.push(handle);
        self.tree.next_id += 1;
        self.tree.nodes.insert(
            handle,
            DomNode {
                tag: spec.tag.to_ascii_uppercase(),
                rect: spec.rect,
                background_image: spec.background_image,
                text: String::new(),
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        self.records
            .push(MutationRecord::child_list(parent, vec![handle], Vec::new()));
        Ok(handle)
    }

    pub fn set_rect(&mut self, node: NodeHandle, rect: Rect) -> Result<()> {
        self.tree.node_mut(node)?.rect = rect;
        self.records.push(MutationRecord::attribute(node, "style"));
        Ok(())
    }

    pub fn set_background_image(&mut self, node: NodeHandle, image: Option<String>) -> Result<()> {
        self.tree.node_mut(node)?.background_image = image;
        self.records.push(MutationRecord::attribute(node, "style"));
        Ok(())
    }

    pub fn set_text(&mut self, node: NodeHandle, text: impl Into<String>) -> Result<()> {
        self.tree.node_mut(node)?.text = text.into();
        self.records.push(MutationRecord::character_data(node));
        Ok(())
    }

    pub fn remove(&mut self, node: NodeHandle) -> Result<()> {
        if node == self.tree.body {
            return Err(simulation_error("the body element cannot be removed"));
        }
        let parent = self
            .tree
            .nodes
            .get(&node)
            .ok_or_else(|| simulation_error(format!("unknown node {:?}", node)))?
            .parent
            .ok_or_else(|| simulation_error(format!("node {:?} is detached", node)))?;
        self.tree.node_mut(parent)?.children.retain(|c| *c != node);
        self.tree.detach_subtree(node);
        self.records
            .push(MutationRecord::child_list(parent, Vec::new(), vec![node]));
        Ok(())
    }
}

struct EntryObserver {
    filter: EntryFilter,
    sender: BatchSender<Vec<PerformanceEntry>>,
}

struct MutationObserver {
    init: MutationObserverInit,
    sender: BatchSender<Vec<MutationRecord>>,
}

#[derive(Default)]
struct TimelineState {
    recorded: Vec<PerformanceEntry>,
    observers: Vec<EntryObserver>,
}

struct Inner {
    config: SimulatedPageConfig,
    origin: Instant,
    dom: RwLock<DomTree>,
    timeline: Mutex<TimelineState>,
    mutation_observers: Mutex<Vec<MutationObserver>>,
    timing: Mutex<NavigationTiming>,
    lifecycle: LifecycleController,
    lifecycle_rx: PageLifecycle,
}

/// In-process page host implementing every capability trait.
///
/// The clock follows `tokio::time`, so paused-time tests drive it
/// deterministically.
#[derive(Clone)]
pub struct SimulatedPage {
    inner: Arc<Inner>,
}

impl SimulatedPage {
    pub fn new(config: SimulatedPageConfig) -> Self {
        let body_rect = config.body_rect.unwrap_or(Rect::new(
            0.0,
            0.0,
            config.viewport.width,
            config.viewport.height,
        ));
        let (lifecycle, lifecycle_rx) = lifecycle_channel();
        let timing = NavigationTiming {
            navigation_start: config.navigation_start,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Inner {
                config,
                origin: Instant::now(),
                dom: RwLock::new(DomTree::new(body_rect)),
                timeline: Mutex::new(TimelineState::default()),
                mutation_observers: Mutex::new(Vec::new()),
                timing: Mutex::new(timing),
                lifecycle,
                lifecycle_rx,
            }),
        }
    }

    pub fn host(&self) -> PageHost {
        PageHost {
            timeline: Arc::new(self.clone()),
            mutations: Arc::new(self.clone()),
            document: Arc::new(self.clone()),
            navigation: Arc::new(self.clone()),
            clock: Arc::new(self.clone()),
        }
    }

    pub fn session(&self, config: PulseConfig) -> PageSession {
        PageSession::new(self.host(), self.inner.lifecycle_rx.clone(), config)
    }

    pub fn lifecycle(&self) -> PageLifecycle {
        self.inner.lifecycle_rx.clone()
    }

    pub fn body_handle(&self) -> NodeHandle {
        self.inner
            .dom
            .read()
            .map(|dom| dom.body)
            .unwrap_or(NodeHandle(1))
    }

    pub fn node_count(&self) -> usize {
        self.inner.dom.read().map(|dom| dom.len()).unwrap_or(0)
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.inner
            .dom
            .read()
            .map(|dom| dom.contains(node))
            .unwrap_or(false)
    }

    pub fn record_entry(&self, entry: PerformanceEntry) -> Result<()> {
        self.record_entries(vec![entry])
    }

    /// Records entries and delivers them to matching observers as one batch.
    pub fn record_entries(&self, entries: Vec<PerformanceEntry>) -> Result<()> {
        let mut timeline = self
            .inner
            .timeline
            .lock()
            .map_err(|_| page_error("timeline lock poisoned"))?;
        timeline.recorded.extend(entries.iter().cloned());
        timeline.observers.retain(|observer| {
            let batch: Vec<PerformanceEntry> = entries
                .iter()
                .filter(|entry| observer.filter.matches(entry))
                .cloned()
                .collect();
            if batch.is_empty() {
                !observer.sender.is_closed()
            } else {
                observer.sender.deliver(batch)
            }
        });
        Ok(())
    }

    /// Applies a group of DOM changes and delivers them as one mutation batch.
    ///
    /// Not transactional: if `change` fails part way, the changes it already
    /// made stay applied and are still delivered before the error returns.
    pub fn mutate<R>(&self, change: impl FnOnce(&mut DomMutator<'_>) -> Result<R>) -> Result<R> {
        let (result, records) = {
            let mut dom = self
                .inner
                .dom
                .write()
                .map_err(|_| page_error("dom lock poisoned"))?;
            let mut mutator = DomMutator {
                tree: &mut *dom,
                records: Vec::new(),
            };
            let result = change(&mut mutator);
            (result, mutator.records)
        };
        self.dispatch_mutations(records)?;
        result
    }

    pub fn append_element(&self, parent: Option<NodeHandle>, spec: ElementSpec) -> Result<NodeHandle> {
        self.mutate(|dom| {
            let parent = parent.unwrap_or_else(|| dom.body());
            dom.append(parent, spec)
        })
    }

    pub fn set_rect(&self, node: NodeHandle, rect: Rect) -> Result<()> {
        self.mutate(|dom| dom.set_rect(node, rect))
    }

    pub fn set_background_image(&self, node: NodeHandle, image: Option<String>) -> Result<()> {
        self.mutate(|dom| dom.set_background_image(node, image))
    }

    pub fn remove_node(&self, node: NodeHandle) -> Result<()> {
        self.mutate(|dom| dom.remove(node))
    }

    pub fn fire_dom_content_loaded(&self) -> Result<()> {
        let now = self.now();
        {
            let mut timing = self
                .inner
                .timing
                .lock()
                .map_err(|_| page_error("timing lock poisoned"))?;
            if timing.dom_content_loaded_event_end > 0.0 {
                return Ok(());
            }
            if timing.dom_interactive <= 0.0 {
                timing.dom_interactive = timing.navigation_start + now;
            }
            timing.dom_content_loaded_event_end = timing.navigation_start + now;
        }
        debug!("simulated DOMContentLoaded at {now:.1}ms");
        self.inner.lifecycle.fire_dom_content_loaded();
        Ok(())
    }

    pub fn fire_load(&self) -> Result<()> {
        self.fire_dom_content_loaded()?;
        let now = self.now();
        {
            let mut timing = self
                .inner
                .timing
                .lock()
                .map_err(|_| page_error("timing lock poisoned"))?;
            if timing.load_event_end > 0.0 {
                return Ok(());
            }
            timing.load_event_end = timing.navigation_start + now;
        }
        debug!("simulated load at {now:.1}ms");
        self.inner.lifecycle.fire_load();
        Ok(())
    }

    pub fn hide(&self) {
        if self.inner.lifecycle.fire_hidden() {
            debug!("simulated page hidden at {:.1}ms", self.now());
        }
    }

    /// Overrides a navigation mark, for hosts whose timings come from elsewhere.
    pub fn set_navigation_timing(&self, timing: NavigationTiming) -> Result<()> {
        let mut guard = self
            .inner
            .timing
            .lock()
            .map_err(|_| page_error("timing lock poisoned"))?;
        *guard = timing;
        Ok(())
    }

    pub fn origin(&self) -> Instant {
        self.inner.origin
    }

    fn dispatch_mutations(&self, records: Vec<MutationRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let dom = self
            .inner
            .dom
            .read()
            .map_err(|_| page_error("dom lock poisoned"))?;
        let mut observers = self
            .inner
            .mutation_observers
            .lock()
            .map_err(|_| page_error("mutation observer lock poisoned"))?;
        observers.retain(|observer| {
            let batch: Vec<MutationRecord> = records
                .iter()
                .filter(|record| {
                    observer.init.accepts_kind(record.kind)
                        && match observer.init.target {
                            None => true,
                            Some(root) if observer.init.subtree => {
                                dom.is_inclusive_descendant(record.target, root)
                            }
                            Some(root) => record.target == root,
                        }
                })
                .cloned()
                .collect();
            if batch.is_empty() {
                !observer.sender.is_closed()
            } else {
                observer.sender.deliver(batch)
            }
        });
        Ok(())
    }
}

impl PerformanceTimeline for SimulatedPage {
    fn supports_observer(&self) -> bool {
        self.inner.config.supports_observer
    }

    fn observe(&self, filter: EntryFilter, buffered: bool) -> Result<EntrySubscription> {
        if !self.supports_observer() {
            return Err(capability_error("PerformanceObserver is not available"));
        }
        let (sender, subscription) = subscription_channel();
        let mut timeline = self
            .inner
            .timeline
            .lock()
            .map_err(|_| page_error("timeline lock poisoned"))?;
        if buffered {
            let replay: Vec<PerformanceEntry> = timeline
                .recorded
                .iter()
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect();
            if !replay.is_empty() {
                sender.deliver(replay);
            }
        }
        timeline.observers.push(EntryObserver { filter, sender });
        Ok(subscription)
    }

    fn entries_by_type(&self, entry_type: EntryType) -> Vec<PerformanceEntry> {
        self.inner
            .timeline
            .lock()
            .map(|timeline| {
                timeline
                    .recorded
                    .iter()
                    .filter(|entry| entry.entry_type == entry_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl MutationSource for SimulatedPage {
    fn observe_mutations(&self, init: MutationObserverInit) -> Result<MutationSubscription> {
        let (sender, subscription) = subscription_channel();
        self.inner
            .mutation_observers
            .lock()
            .map_err(|_| page_error("mutation observer lock poisoned"))?
            .push(MutationObserver { init, sender });
        Ok(subscription)
    }
}

impl DocumentLayout for SimulatedPage {
    fn body(&self) -> Option<NodeHandle> {
        self.inner.dom.read().ok().map(|dom| dom.body)
    }

    fn children(&self, node: NodeHandle) -> Vec<Option<NodeHandle>> {
        self.inner
            .dom
            .read()
            .map(|dom| {
                dom.nodes
                    .get(&node)
                    .map(|n| {
                        n.children
                            .iter()
                            .map(|child| dom.contains(*child).then_some(*child))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn tag_name(&self, node: NodeHandle) -> String {
        self.inner
            .dom
            .read()
            .ok()
            .and_then(|dom| dom.nodes.get(&node).map(|n| n.tag.clone()))
            .unwrap_or_default()
    }

    fn bounding_rect(&self, node: NodeHandle) -> Rect {
        self.inner
            .dom
            .read()
            .ok()
            .and_then(|dom| dom.nodes.get(&node).map(|n| n.rect))
            .unwrap_or_default()
    }

    fn background_image(&self, node: NodeHandle) -> Option<String> {
        self.inner
            .dom
            .read()
            .ok()
            .and_then(|dom| dom.nodes.get(&node).and_then(|n| n.background_image.clone()))
    }

    fn viewport(&self) -> Viewport {
        self.inner.config.viewport
    }
}

impl NavigationTimingSource for SimulatedPage {
    fn navigation_timing(&self) -> Option<NavigationTiming> {
        if !self.inner.config.supports_navigation_timing {
            return None;
        }
        self.inner.timing.lock().ok().map(|timing| *timing)
    }
}

impl Clock for SimulatedPage {
    fn now(&self) -> f64 {
        self.inner.origin.elapsed().as_micros() as f64 / 1_000.0
    }
}

pub fn simulation_error(message: impl Into<String>) -> PulseError {
    PulseError::Scenario(message.into())
}
