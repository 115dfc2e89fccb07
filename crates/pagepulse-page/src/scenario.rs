//! TOML-described page timelines replayed against a [`SimulatedPage`].

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use pagepulse_types::{
    entries::PerformanceEntry,
    layout::{NodeHandle, Rect, Viewport},
    PulseError, Result,
};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, Duration};
use tracing::{debug, info};

use crate::{
    simulated::{simulation_error, DomMutator},
    Clock, ElementSpec, SimulatedPage,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Delivery time in milliseconds since navigation start.
    pub at_ms: u64,
    pub action: StepAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepAction {
    Paint {
        name: String,
    },
    LargestContentfulPaint {
        #[serde(default)]
        start_ms: Option<f64>,
    },
    LongTask {
        #[serde(default)]
        start_ms: Option<f64>,
        duration_ms: f64,
    },
    /// Delivered when the response completes, i.e. at `at_ms`.
    Resource {
        url: String,
        start_ms: f64,
        #[serde(default)]
        initiator: Option<String>,
    },
    Interaction {
        #[serde(default = "default_interaction_name")]
        name: String,
        duration_ms: f64,
        interaction_id: u64,
    },
    Mutate {
        ops: Vec<DomOp>,
    },
    DomContentLoaded,
    Load,
    Hide,
}

fn default_interaction_name() -> String {
    "click".into()
}

/// Element operations keyed by scenario-local names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum DomOp {
    Append {
        key: String,
        #[serde(default)]
        parent: Option<String>,
        tag: String,
        rect: Rect,
        #[serde(default)]
        background_image: Option<String>,
    },
    Resize {
        key: String,
        rect: Rect,
    },
    Background {
        key: String,
        #[serde(default)]
        image: Option<String>,
    },
    Text {
        key: String,
        text: String,
    },
    Remove {
        key: String,
    },
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PulseError::Scenario(format!(
                "unable to read scenario file {}: {err}",
                path_ref.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|err| PulseError::Scenario(format!("failed to parse scenario: {err}")))
    }

    /// Time of the last step.
    pub fn duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.at_ms).max().unwrap_or(0)
    }
}

fn lookup(keys: &HashMap<String, NodeHandle>, key: &str) -> Result<NodeHandle> {
    keys.get(key)
        .copied()
        .ok_or_else(|| simulation_error(format!("unknown element key '{key}'")))
}

/// Walks the ops against the key set they would produce, so a step naming an
/// unknown key is rejected before any of its changes reach the page.
fn check_keys(keys: &HashMap<String, NodeHandle>, ops: &[DomOp]) -> Result<()> {
    let mut known: HashSet<&str> = keys.keys().map(String::as_str).collect();
    let require = |known: &HashSet<&str>, key: &str| {
        if known.contains(key) {
            Ok(())
        } else {
            Err(simulation_error(format!("unknown element key '{key}'")))
        }
    };
    for op in ops {
        match op {
            DomOp::Append { key, parent, .. } => {
                if let Some(parent) = parent {
                    require(&known, parent)?;
                }
                known.insert(key.as_str());
            }
            DomOp::Resize { key, .. } | DomOp::Background { key, .. } | DomOp::Text { key, .. } => {
                require(&known, key)?
            }
            DomOp::Remove { key } => {
                require(&known, key)?;
                known.remove(key.as_str());
            }
        }
    }
    Ok(())
}

fn apply_op(dom: &mut DomMutator<'_>, keys: &mut HashMap<String, NodeHandle>, op: &DomOp) -> Result<()> {
    match op {
        DomOp::Append {
            key,
            parent,
            tag,
            rect,
            background_image,
        } => {
            let parent = match parent {
                Some(parent) => lookup(keys, parent)?,
                None => dom.body(),
            };
            let spec = match background_image {
                Some(image) => ElementSpec::new(tag.clone(), *rect).with_background(image.clone()),
                None => ElementSpec::new(tag.clone(), *rect),
            };
            let handle = dom.append(parent, spec)?;
            keys.insert(key.clone(), handle);
        }
        DomOp::Resize { key, rect } => dom.set_rect(lookup(keys, key)?, *rect)?,
        DomOp::Background { key, image } => {
            dom.set_background_image(lookup(keys, key)?, image.clone())?
        }
        DomOp::Text { key, text } => dom.set_text(lookup(keys, key)?, text.clone())?,
        DomOp::Remove { key } => {
            let handle = lookup(keys, key)?;
            dom.remove(handle)?;
            keys.remove(key);
        }
    }
    Ok(())
}

impl SimulatedPage {
    /// Replays `scenario` step by step, sleeping until each step's delivery time.
    pub async fn play(&self, scenario: &Scenario) -> Result<()> {
        let mut steps: Vec<&ScenarioStep> = scenario.steps.iter().collect();
        steps.sort_by_key(|step| step.at_ms);
        let mut keys: HashMap<String, NodeHandle> = HashMap::new();
        info!(
            "Playing scenario '{}' ({} steps, {}ms)",
            scenario.name,
            steps.len(),
            scenario.duration_ms()
        );

        for step in steps {
            sleep_until(self.origin() + Duration::from_millis(step.at_ms)).await;
            let now = self.now();
            debug!("scenario step at {:.1}ms: {:?}", now, step.action);
            self.apply_step(&step.action, now, &mut keys)?;
        }
        Ok(())
    }

    fn apply_step(
        &self,
        action: &StepAction,
        now: f64,
        keys: &mut HashMap<String, NodeHandle>,
    ) -> Result<()> {
        match action {
            StepAction::Paint { name } => {
                self.record_entry(PerformanceEntry::paint(name.clone(), now))
            }
            StepAction::LargestContentfulPaint { start_ms } => self.record_entry(
                PerformanceEntry::largest_contentful_paint(start_ms.unwrap_or(now)),
            ),
            StepAction::LongTask {
                start_ms,
                duration_ms,
            } => self.record_entry(PerformanceEntry::long_task(
                start_ms.unwrap_or(now),
                *duration_ms,
            )),
            StepAction::Resource {
                url,
                start_ms,
                initiator,
            } => self.record_entry(PerformanceEntry::resource(
                url.clone(),
                *start_ms,
                now.max(*start_ms),
                initiator.clone(),
            )),
            StepAction::Interaction {
                name,
                duration_ms,
                interaction_id,
            } => self.record_entry(PerformanceEntry::interaction(
                name.clone(),
                now,
                *duration_ms,
                *interaction_id,
            )),
            StepAction::Mutate { ops } => {
                check_keys(keys, ops)?;
                self.mutate(|dom| {
                    for op in ops {
                        apply_op(dom, keys, op)?;
                    }
                    Ok(())
                })
            }
            StepAction::DomContentLoaded => self.fire_dom_content_loaded(),
            StepAction::Load => self.fire_load(),
            StepAction::Hide => {
                self.hide();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DocumentLayout, MutationObserverInit, MutationSource, PerformanceTimeline,
        SimulatedPageConfig,
    };
    use pagepulse_types::entries::{EntryFilter, EntryType};

    const SCENARIO: &str = r#"
name = "hero page"

[[steps]]
at_ms = 120
[steps.action]
kind = "paint"
name = "first-contentful-paint"

[[steps]]
at_ms = 300
[steps.action]
kind = "mutate"
[[steps.action.ops]]
op = "append"
key = "hero"
tag = "img"
rect = { x = 0, y = 0, width = 640, height = 320 }

[[steps]]
at_ms = 450
[steps.action]
kind = "long-task"
duration_ms = 120

[[steps]]
at_ms = 900
[steps.action]
kind = "load"
"#;

    #[test]
    fn parse_scenario_steps() {
        let scenario = Scenario::from_toml_str(SCENARIO).expect("parse scenario");
        assert_eq!(scenario.name, "hero page");
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(scenario.duration_ms(), 900);
        assert!(matches!(
            scenario.steps[2].action,
            StepAction::LongTask { duration_ms, start_ms: None } if duration_ms == 120.0
        ));
    }

    #[tokio::test]
    async fn play_scenario_in_virtual_time() {
        tokio::time::pause();
        let scenario = Scenario::from_toml_str(SCENARIO).expect("parse scenario");
        let page = SimulatedPage::new(SimulatedPageConfig::default());
        let mut mutations = page
            .observe_mutations(MutationObserverInit::document_wide())
            .expect("observe");

        page.play(&scenario).await.expect("play");

        let tasks = page.entries_by_type(EntryType::LongTask);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].start_time, 450.0);
        let batch = mutations.next_batch().await.expect("mutation batch");
        assert_eq!(batch.len(), 1);
        let hero = batch[0].added[0];
        assert_eq!(page.tag_name(hero), "IMG");
        assert!(page.lifecycle().is_loaded());

        let mut paints = page
            .observe(EntryFilter::single(EntryType::Paint), true)
            .expect("observe");
        let replay = paints.next_batch().await.expect("paint replay");
        assert_eq!(replay[0].start_time, 120.0);
    }

    #[tokio::test]
    async fn unknown_key_fails_the_step() {
        let scenario = Scenario::from_toml_str(
            r#"
[[steps]]
at_ms = 0
[steps.action]
kind = "mutate"
[[steps.action.ops]]
op = "remove"
key = "missing"
"#,
        )
        .expect("parse scenario");
        let page = SimulatedPage::new(SimulatedPageConfig::default());
        let err = page.play(&scenario).await.expect_err("unknown key");
        assert!(matches!(err, PulseError::Scenario(_)));
    }

    #[tokio::test]
    async fn failing_step_leaves_the_page_untouched() {
        let scenario = Scenario::from_toml_str(
            r#"
[[steps]]
at_ms = 0
[steps.action]
kind = "mutate"
[[steps.action.ops]]
op = "append"
key = "banner"
tag = "div"
rect = { x = 0, y = 0, width = 800, height = 200 }
background_image = "url(banner.png)"
[[steps.action.ops]]
op = "text"
key = "missing"
text = "late"
"#,
        )
        .expect("parse scenario");
        tokio::time::pause();
        let page = SimulatedPage::new(SimulatedPageConfig::default());
        let mut mutations = page
            .observe_mutations(MutationObserverInit::document_wide())
            .expect("observe");

        let err = page.play(&scenario).await.expect_err("unknown key");
        assert!(matches!(err, PulseError::Scenario(_)));
        assert!(page.children(page.body_handle()).is_empty());
        let pending = tokio::time::timeout(Duration::from_millis(50), mutations.next_batch()).await;
        assert!(pending.is_err(), "no mutation batch expected");
    }

    #[tokio::test]
    async fn append_carries_background_image() {
        let scenario = Scenario::from_toml_str(
            r#"
[[steps]]
at_ms = 0
[steps.action]
kind = "mutate"
[[steps.action.ops]]
op = "append"
key = "banner"
tag = "div"
rect = { x = 0, y = 0, width = 800, height = 200 }
background_image = "url(banner.png)"
"#,
        )
        .expect("parse scenario");
        let page = SimulatedPage::new(SimulatedPageConfig::default());
        page.play(&scenario).await.expect("play");
        let banner = page.children(page.body_handle())[0].expect("banner attached");
        assert_eq!(page.background_image(banner).as_deref(), Some("url(banner.png)"));
    }
}
