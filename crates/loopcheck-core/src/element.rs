//! Accessibility tree nodes as the agent reports them, and lookups over them.

use serde::{Deserialize, Serialize};

/// A node in the accessibility hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    /// The accessibility identifier (AXUniqueId).
    #[serde(rename = "AXUniqueId", default)]
    pub identifier: Option<String>,

    /// The accessibility label (AXLabel), usually the visible text.
    #[serde(rename = "AXLabel", default)]
    pub label: Option<String>,

    #[serde(rename = "AXValue", default)]
    pub value: Option<String>,

    /// "Button", "StaticText", "NavigationBar", ...
    #[serde(rename = "type", default)]
    pub element_type: Option<String>,

    #[serde(default)]
    pub frame: Option<ElementFrame>,

    #[serde(default)]
    pub children: Vec<UIElement>,
}

impl UIElement {
    /// The text a reader would see: the label, else the value, else "".
    pub fn display_text(&self) -> &str {
        self.label.as_deref().or(self.value.as_deref()).unwrap_or("")
    }

    pub fn is_type(&self, element_type: &str) -> bool {
        self.element_type.as_deref() == Some(element_type)
    }
}

/// Position and size in screen points, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementFrame {
    /// Centre point, rounded to whole screen points.
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x + self.width / 2.0).round() as i32,
            (self.y + self.height / 2.0).round() as i32,
        )
    }
}

/// First element in depth-first pre-order that satisfies `pred`.
pub fn find_first<'a>(tree: &'a [UIElement], pred: &dyn Fn(&UIElement) -> bool) -> Option<&'a UIElement> {
    tree.iter()
        .find_map(|el| if pred(el) { Some(el) } else { find_first(&el.children, pred) })
}

/// An element lookup: exact accessibility identifier, optionally of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementQuery {
    pub identifier: String,
    pub element_type: Option<String>,
}

impl ElementQuery {
    pub fn id(identifier: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), element_type: None }
    }

    pub fn of_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    pub fn matches(&self, el: &UIElement) -> bool {
        el.identifier.as_deref() == Some(self.identifier.as_str())
            && self.element_type.as_deref().map_or(true, |t| el.is_type(t))
    }

    pub fn first_in<'a>(&self, tree: &'a [UIElement]) -> Option<&'a UIElement> {
        find_first(tree, &|el| self.matches(el))
    }
}
