use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque reference to a node owned by the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

/// Border box of a node in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Fraction of `rect` inside the viewport; zero-area boxes count as invisible.
    pub fn visible_fraction(&self, rect: &Rect) -> f64 {
        let total = rect.area();
        if !(total > 0.0) {
            return 0.0;
        }
        let visible_width = (rect.right().min(self.width) - rect.left().max(0.0)).max(0.0);
        let visible_height = (rect.bottom().min(self.height) - rect.top().max(0.0)).max(0.0);
        visible_width * visible_height / total
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 800.0)
    }
}

/// Importance weights used when scoring a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeWeights {
    pub default_weight: f64,
    pub background_image: f64,
    /// Upper-case tag name to weight.
    pub tags: BTreeMap<String, f64>,
}

impl NodeWeights {
    pub fn uniform(weight: f64) -> Self {
        Self {
            default_weight: weight,
            background_image: weight,
            tags: BTreeMap::new(),
        }
    }

    pub fn weight_for(&self, tag_name: &str, has_background_image: bool) -> f64 {
        if has_background_image {
            return self.background_image;
        }
        self.tags
            .get(&tag_name.to_ascii_uppercase())
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for NodeWeights {
    fn default() -> Self {
        let table: [(&str, f64); 16] = [
            ("IMG", 10.0),
            ("SVG", 10.0),
            ("CANVAS", 10.0),
            ("VIDEO", 10.0),
            ("P", 5.0),
            ("H1", 5.0),
            ("H2", 5.0),
            ("H3", 5.0),
            ("BUTTON", 7.0),
            ("A", 8.0),
            ("DIV", 8.0),
            ("SPAN", 8.0),
            ("SECTION", 5.0),
            ("ARTICLE", 6.0),
            ("TABLE", 4.0),
            ("FORM", 7.0),
        ];
        Self {
            default_weight: 5.0,
            background_image: 10.0,
            tags: table
                .iter()
                .map(|(tag, weight)| (tag.to_string(), *weight))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partially_visible_rect() {
        let viewport = Viewport::new(100.0, 100.0);
        let rect = Rect::new(50.0, 0.0, 100.0, 100.0);
        assert!((viewport.visible_fraction(&rect) - 0.5).abs() < f64::EPSILON);
        assert_eq!(viewport.visible_fraction(&Rect::new(200.0, 0.0, 10.0, 10.0)), 0.0);
        assert_eq!(viewport.visible_fraction(&Rect::default()), 0.0);
    }

    #[test]
    fn background_image_overrides_tag_weight() {
        let weights = NodeWeights::default();
        assert_eq!(weights.weight_for("table", false), 4.0);
        assert_eq!(weights.weight_for("table", true), 10.0);
        assert_eq!(weights.weight_for("main", false), 5.0);
    }
}
