use pagepulse_page::DocumentLayout;
use pagepulse_types::layout::{NodeHandle, NodeWeights, Viewport};

/// Contribution of a stack entry whose node has disappeared.
pub const MISSING_NODE_SCORE: f64 = 5.0;

/// Scores how much visible, weighted content a document currently shows.
#[derive(Debug, Clone, Default)]
pub struct DomScorer {
    weights: NodeWeights,
}

impl DomScorer {
    pub fn new(weights: NodeWeights) -> Self {
        Self { weights }
    }

    /// Sum of node scores starting at the document body.
    pub fn score(&self, layout: &dyn DocumentLayout) -> f64 {
        self.score_from(layout, layout.body())
    }

    /// Depth-first walk with an explicit stack, so deep trees cannot overflow.
    pub fn score_from(&self, layout: &dyn DocumentLayout, root: Option<NodeHandle>) -> f64 {
        let viewport = layout.viewport();
        let mut score = 0.0;
        let mut stack = vec![root];

        while let Some(entry) = stack.pop() {
            let Some(node) = entry else {
                score += MISSING_NODE_SCORE;
                continue;
            };
            score += self.node_score(layout, node, &viewport);
            stack.extend(layout.children(node));
        }

        score
    }

    pub fn node_weight(&self, layout: &dyn DocumentLayout, node: NodeHandle) -> f64 {
        let has_background = layout
            .background_image(node)
            .map(|image| {
                let image = image.trim();
                !image.is_empty() && image != "none"
            })
            .unwrap_or(false);
        self.weights
            .weight_for(&layout.tag_name(node), has_background)
    }

    fn node_score(&self, layout: &dyn DocumentLayout, node: NodeHandle, viewport: &Viewport) -> f64 {
        let rect = layout.bounding_rect(node);
        let area_percent = viewport.visible_fraction(&rect);
        let weight = self.node_weight(layout, node);
        or_one(rect.width) * or_one(rect.height) * or_one(weight) * area_percent
    }
}

/// Scores the document with the default weight table.
pub fn compute_score(layout: &dyn DocumentLayout) -> f64 {
    DomScorer::default().score(layout)
}

// Zero or NaN factors would collapse the product.
fn or_one(value: f64) -> f64 {
    if value == 0.0 || value.is_nan() {
        1.0
    } else {
        value
    }
}
