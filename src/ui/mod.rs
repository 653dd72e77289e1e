//! Declarative control panels.
//!
//! A [`UiSpec`] is a flat description of a panel: a root element id, a map of
//! element id to `{type, props, children}`, and an initial state record. It is
//! compiled once into a [`WidgetTree`] against the fixed component
//! [`catalog`]. Props are either literal JSON values or bindings of the form
//! `{"$bindState": "/effect/<key>"}` that resolve against the live
//! [`StateRecord`] and carry the path back to the [`bridge`].
//!
//! Imperative UI scripts build the same structure as a nested node tree (see
//! [`UiSpec::from_node_tree`]), so both modes share one compiler.
//!
//! # Example
//!
//! ```json
//! {
//!   "root": "main",
//!   "elements": {
//!     "main": { "type": "Card", "props": { "title": "Chase" }, "children": ["count"] },
//!     "count": { "type": "CupertinoSlider",
//!                "props": { "label": "Count", "min": 1, "max": 10,
//!                           "value": { "$bindState": "/effect/chaseCount" } } }
//!   },
//!   "state": { "effect": { "chaseCount": 2 } }
//! }
//! ```

pub mod bridge;
pub mod catalog;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::color::{hsv_to_rgb, Rgb};
pub use bridge::{BindingBridge, BridgeAction, BridgeConfig, MachineControl, StateRecord};
pub use catalog::Component;

/// Key marking a prop as bound to a state path
pub const BIND_STATE: &str = "$bindState";

/// Errors found while compiling a panel description
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UiSpecError {
    #[error("Root element '{0}' is not defined")]
    MissingRoot(String),

    #[error("Element '{id}' uses unknown component '{component}'")]
    UnknownComponent { id: String, component: String },

    #[error("Element '{parent}' references undefined child '{child}'")]
    DanglingChild { parent: String, child: String },

    #[error("Element '{0}' is reachable through a cycle")]
    Cycle(String),

    #[error("Element '{id}' ({component}) has no prop '{prop}'")]
    UnknownProp {
        id: String,
        component: Component,
        prop: String,
    },

    #[error("Element '{id}' ({component}) is missing required prop '{prop}'")]
    MissingProp {
        id: String,
        component: Component,
        prop: &'static str,
    },

    #[error("Element '{id}' prop '{prop}': {message}")]
    InvalidProp {
        id: String,
        prop: String,
        message: String,
    },

    #[error("Element '{id}' ({component}) cannot have children")]
    UnexpectedChildren { id: String, component: Component },

    #[error("Malformed UI description: {0}")]
    Malformed(String),

    #[error("Panel script failed: {0}")]
    Render(String),
}

// ── Spec model ───────────────────────────────────────────────────────

/// Speed control range declared by a panel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedConfig {
    pub min: u64,
    pub max: u64,
    pub default: u64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min: 20,
            max: 1000,
            default: 200,
        }
    }
}

impl SpeedConfig {
    /// Clamp a requested interval into the declared range
    pub fn clamp(&self, ms: f64) -> u64 {
        let lo = self.min.min(self.max) as f64;
        let hi = self.max.max(self.min) as f64;
        ms.round().clamp(lo, hi) as u64
    }
}

/// One element of a panel description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    #[serde(rename = "type")]
    pub component: String,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

/// Declarative panel description (`<id>/ui.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSpec {
    pub root: String,
    pub elements: BTreeMap<String, UiElement>,
    #[serde(default = "empty_object")]
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedConfig>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl UiSpec {
    pub fn from_json(text: &str) -> Result<Self, UiSpecError> {
        serde_json::from_str(text).map_err(|e| UiSpecError::Malformed(e.to_string()))
    }

    pub fn speed_config(&self) -> SpeedConfig {
        self.speed.unwrap_or_default()
    }

    /// Flatten a nested node tree (`{type, props, children: [node, ...]}`)
    /// into a spec. Element ids are assigned in depth-first order.
    pub fn from_node_tree(node: &Value, state: Value) -> Result<Self, UiSpecError> {
        let mut elements = BTreeMap::new();
        let root = flatten_node(node, &mut elements)?;
        Ok(Self {
            root,
            elements,
            state,
            bridge: None,
            speed: None,
        })
    }

    /// Validate against the catalog and build the widget tree
    pub fn compile(&self) -> Result<WidgetTree, UiSpecError> {
        if !self.elements.contains_key(&self.root) {
            return Err(UiSpecError::MissingRoot(self.root.clone()));
        }
        let mut visiting = HashSet::new();
        let root = self.compile_element(&self.root, &mut visiting)?;
        Ok(WidgetTree { root })
    }

    fn compile_element(
        &self,
        id: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<Widget, UiSpecError> {
        if !visiting.insert(id.to_string()) {
            return Err(UiSpecError::Cycle(id.to_string()));
        }
        // Callers only pass ids already checked to exist
        let element = self
            .elements
            .get(id)
            .ok_or_else(|| UiSpecError::MissingRoot(id.to_string()))?;

        let component = Component::from_name(&element.component).ok_or_else(|| {
            UiSpecError::UnknownComponent {
                id: id.to_string(),
                component: element.component.clone(),
            }
        })?;

        let props = compile_props(id, component, &element.props)?;

        if !element.children.is_empty() && !component.has_slot() {
            return Err(UiSpecError::UnexpectedChildren {
                id: id.to_string(),
                component,
            });
        }
        let mut children = Vec::with_capacity(element.children.len());
        for child in &element.children {
            if !self.elements.contains_key(child) {
                return Err(UiSpecError::DanglingChild {
                    parent: id.to_string(),
                    child: child.clone(),
                });
            }
            children.push(self.compile_element(child, visiting)?);
        }

        visiting.remove(id);
        Ok(Widget {
            id: id.to_string(),
            component,
            props,
            children,
        })
    }
}

fn flatten_node(
    node: &Value,
    elements: &mut BTreeMap<String, UiElement>,
) -> Result<String, UiSpecError> {
    let obj = node
        .as_object()
        .ok_or_else(|| UiSpecError::Malformed(format!("expected a node object, got {node}")))?;
    let component = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| UiSpecError::Malformed("node is missing 'type'".to_string()))?
        .to_string();
    let props = match obj.get("props") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(other) => {
            return Err(UiSpecError::Malformed(format!(
                "props of {component} must be an object, got {other}"
            )))
        }
    };

    let id = format!("n{}", elements.len());
    // Reserve the id before recursing so ids follow depth-first order
    elements.insert(
        id.clone(),
        UiElement {
            component: component.clone(),
            props: props.clone(),
            children: Vec::new(),
        },
    );

    let mut children = Vec::new();
    match obj.get("children") {
        None | Some(Value::Null) => {}
        Some(Value::Array(nodes)) => {
            for child in nodes {
                children.push(flatten_node(child, elements)?);
            }
        }
        Some(other) => {
            return Err(UiSpecError::Malformed(format!(
                "children of {component} must be an array, got {other}"
            )))
        }
    }

    if let Some(element) = elements.get_mut(&id) {
        element.children = children;
    }
    Ok(id)
}

fn compile_props(
    id: &str,
    component: Component,
    raw: &Map<String, Value>,
) -> Result<BTreeMap<String, PropValue>, UiSpecError> {
    let mut props = BTreeMap::new();
    for (name, value) in raw {
        let schema = component
            .prop(name)
            .ok_or_else(|| UiSpecError::UnknownProp {
                id: id.to_string(),
                component,
                prop: name.clone(),
            })?;
        let invalid = |message: String| UiSpecError::InvalidProp {
            id: id.to_string(),
            prop: name.clone(),
            message,
        };

        let prop = match PropValue::parse(value).map_err(invalid)? {
            PropValue::Literal(Value::Null) if !schema.required => continue,
            PropValue::Literal(v) => {
                schema.kind.check(&v).map_err(invalid)?;
                PropValue::Literal(v)
            }
            bound => bound,
        };
        props.insert(name.clone(), prop);
    }

    for schema in component.props().iter().filter(|s| s.required) {
        if !props.contains_key(schema.name) {
            return Err(UiSpecError::MissingProp {
                id: id.to_string(),
                component,
                prop: schema.name,
            });
        }
    }
    Ok(props)
}

// ── Widget tree ──────────────────────────────────────────────────────

/// Prop after compilation: a literal or a state binding
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Literal(Value),
    Bound { path: String },
}

impl PropValue {
    fn parse(value: &Value) -> Result<Self, String> {
        let Some(obj) = value.as_object() else {
            return Ok(Self::Literal(value.clone()));
        };
        let Some(binding) = obj.get(BIND_STATE) else {
            return Ok(Self::Literal(value.clone()));
        };
        match binding.as_str() {
            Some(path) if path.starts_with('/') && obj.len() == 1 => Ok(Self::Bound {
                path: path.to_string(),
            }),
            _ => Err(format!("invalid binding {value}")),
        }
    }

    /// Current value, reading bindings from `state`
    pub fn resolve<'a>(&'a self, state: &'a StateRecord) -> Option<&'a Value> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Bound { path } => state.get(path),
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Bound { path } => Some(path),
            Self::Literal(_) => None,
        }
    }
}

/// Compiled panel element
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: String,
    pub component: Component,
    pub props: BTreeMap<String, PropValue>,
    pub children: Vec<Widget>,
}

impl Widget {
    fn literal_str(&self, name: &str) -> Option<&str> {
        match self.props.get(name)? {
            PropValue::Literal(v) => v.as_str(),
            PropValue::Bound { .. } => None,
        }
    }

    fn literal_f64(&self, name: &str) -> Option<f64> {
        match self.props.get(name)? {
            PropValue::Literal(v) => v.as_f64(),
            PropValue::Bound { .. } => None,
        }
    }

    fn text(&self, name: &str, state: &StateRecord) -> String {
        match self.props.get(name).and_then(|p| p.resolve(state)) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn number(&self, name: &str, state: &StateRecord) -> Option<f64> {
        self.props.get(name)?.resolve(state)?.as_f64()
    }
}

/// A bound, adjustable control extracted from the widget tree
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub label: String,
    pub path: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub unit: String,
}

impl Control {
    /// Move `current` by `steps` increments, clamped to the range
    pub fn adjust(&self, current: f64, steps: i32) -> f64 {
        let next = current + self.step * steps as f64;
        next.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

/// One rendered line of a panel
#[derive(Debug, Clone, PartialEq)]
pub struct PanelLine {
    pub indent: usize,
    pub text: String,
    pub swatch: Option<Rgb>,
    /// Index into [`WidgetTree::controls`] when the line is adjustable
    pub control: Option<usize>,
}

/// Compiled panel
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetTree {
    pub root: Widget,
}

impl WidgetTree {
    /// Bound controls in depth-first order
    pub fn controls(&self) -> Vec<Control> {
        let mut out = Vec::new();
        collect_controls(&self.root, &mut out);
        out
    }

    /// Render the panel against the current state
    pub fn render(&self, state: &StateRecord) -> Vec<PanelLine> {
        let mut lines = Vec::new();
        let mut next_control = 0;
        render_widget(&self.root, state, 0, &mut next_control, &mut lines);
        lines
    }

    /// Outline of the tree (component and id per line)
    pub fn outline(&self) -> Vec<String> {
        let mut out = Vec::new();
        outline_widget(&self.root, 0, &mut out);
        out
    }
}

const HSV_CHANNELS: [(&str, &str, f64, &str); 3] = [
    ("hue", "Hue", 360.0, "°"),
    ("saturation", "Saturation", 100.0, "%"),
    ("brightness", "Brightness", 100.0, "%"),
];

fn collect_controls(widget: &Widget, out: &mut Vec<Control>) {
    match widget.component {
        Component::CupertinoSlider => {
            if let Some(path) = widget.props.get("value").and_then(PropValue::path) {
                out.push(Control {
                    label: widget.literal_str("label").unwrap_or(widget.id.as_str()).to_string(),
                    path: path.to_string(),
                    min: widget.literal_f64("min").unwrap_or(0.0),
                    max: widget.literal_f64("max").unwrap_or(100.0),
                    step: widget.literal_f64("step").unwrap_or(1.0),
                    unit: widget.literal_str("unit").unwrap_or_default().to_string(),
                });
            }
        }
        Component::ColorHSV => {
            for (prop, label, max, unit) in HSV_CHANNELS {
                if let Some(path) = widget.props.get(prop).and_then(PropValue::path) {
                    out.push(Control {
                        label: label.to_string(),
                        path: path.to_string(),
                        min: 0.0,
                        max,
                        step: if prop == "hue" { 5.0 } else { 1.0 },
                        unit: unit.to_string(),
                    });
                }
            }
        }
        _ => {}
    }
    for child in &widget.children {
        collect_controls(child, out);
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n:.2}")
    }
}

fn render_widget(
    widget: &Widget,
    state: &StateRecord,
    indent: usize,
    next_control: &mut usize,
    lines: &mut Vec<PanelLine>,
) {
    let mut push = |indent: usize, text: String, swatch: Option<Rgb>, control: Option<usize>| {
        lines.push(PanelLine {
            indent,
            text,
            swatch,
            control,
        })
    };

    let child_indent = match widget.component {
        Component::Stack => indent,
        Component::Card => {
            let title = widget.text("title", state);
            if !title.is_empty() {
                push(indent, title, None, None);
            }
            indent + 1
        }
        Component::CupertinoSlider => {
            let label = widget.text("label", state);
            let unit = widget.text("unit", state);
            let value = widget
                .number("value", state)
                .map(format_number)
                .unwrap_or_else(|| "-".to_string());
            let range = format!(
                "{}..{}",
                widget.number("min", state).map(format_number).unwrap_or_default(),
                widget.number("max", state).map(format_number).unwrap_or_default()
            );
            let bound = widget.props.get("value").and_then(PropValue::path).is_some();
            let control = bound.then(|| {
                let c = *next_control;
                *next_control += 1;
                c
            });
            push(indent, format!("{label}: {value}{unit} [{range}]"), None, control);
            indent
        }
        Component::ColorHSV => {
            let h = widget.number("hue", state).unwrap_or(0.0);
            let s = widget.number("saturation", state).unwrap_or(100.0);
            let v = widget.number("brightness", state).unwrap_or(100.0);
            let swatch = hsv_to_rgb(h, s / 100.0, v / 100.0);
            push(
                indent,
                format!("{} #{}", widget.text("label", state), swatch.to_hex()),
                Some(swatch),
                None,
            );
            for (prop, label, _, unit) in HSV_CHANNELS {
                let value = widget.number(prop, state).map(format_number).unwrap_or_default();
                let bound = widget.props.get(prop).and_then(PropValue::path).is_some();
                let control = bound.then(|| {
                    let c = *next_control;
                    *next_control += 1;
                    c
                });
                push(indent + 1, format!("{label}: {value}{unit}"), None, control);
            }
            indent
        }
        Component::Text => {
            push(indent, widget.text("text", state), None, None);
            indent
        }
    };

    for child in &widget.children {
        render_widget(child, state, child_indent, next_control, lines);
    }
}

fn outline_widget(widget: &Widget, depth: usize, out: &mut Vec<String>) {
    let bindings: Vec<String> = widget
        .props
        .iter()
        .filter_map(|(name, p)| p.path().map(|path| format!("{name}->{path}")))
        .collect();
    let mut line = format!("{}{} #{}", "  ".repeat(depth), widget.component, widget.id);
    if !bindings.is_empty() {
        line.push_str(&format!(" [{}]", bindings.join(", ")));
    }
    out.push(line);
    for child in &widget.children {
        outline_widget(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chase_spec() -> Value {
        json!({
            "root": "main",
            "elements": {
                "main": { "type": "Stack", "props": { "gap": "md" }, "children": ["color", "count"] },
                "color": { "type": "ColorHSV", "props": {
                    "label": "Color",
                    "hue": { "$bindState": "/effect/hue" },
                    "saturation": { "$bindState": "/effect/saturation" },
                    "brightness": { "$bindState": "/effect/brightness" }
                } },
                "count": { "type": "CupertinoSlider", "props": {
                    "label": "Chase count", "min": 1, "max": 6, "step": null,
                    "value": { "$bindState": "/effect/chaseCount" }
                } }
            },
            "state": { "effect": { "hue": 0, "saturation": 100, "brightness": 100, "chaseCount": 2 } },
            "bridge": { "colorKeys": ["hue", "saturation", "brightness"] }
        })
    }

    fn spec(value: Value) -> UiSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_compile_and_controls() {
        let spec = spec(chase_spec());
        assert_eq!(spec.speed_config(), SpeedConfig::default());
        let tree = spec.compile().unwrap();
        assert_eq!(tree.root.children.len(), 2);

        let controls = tree.controls();
        let paths: Vec<_> = controls.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/effect/hue",
                "/effect/saturation",
                "/effect/brightness",
                "/effect/chaseCount"
            ]
        );
        assert_eq!(controls[3].max, 6.0);
        assert_eq!(controls[3].adjust(6.0, 1), 6.0);
        assert_eq!(controls[0].adjust(10.0, -1), 5.0);
    }

    #[test]
    fn test_render_resolves_bindings() {
        let spec = spec(chase_spec());
        let tree = spec.compile().unwrap();
        let state = StateRecord::new(spec.state.clone());
        let lines = tree.render(&state);

        assert_eq!(lines[0].swatch, Some(Rgb::new(255, 0, 0)));
        assert_eq!(lines[1].text, "Hue: 0°");
        assert_eq!(lines[1].control, Some(0));
        let last = lines.last().unwrap();
        assert_eq!(last.text, "Chase count: 2 [1..6]");
        assert_eq!(last.control, Some(3));
    }

    #[test]
    fn test_unknown_component() {
        let mut value = chase_spec();
        value["elements"]["count"]["type"] = json!("Button");
        let err = spec(value).compile().unwrap_err();
        assert!(matches!(err, UiSpecError::UnknownComponent { .. }));
    }

    #[test]
    fn test_structure_errors() {
        let mut value = chase_spec();
        value["elements"]["main"]["children"] = json!(["color", "missing"]);
        assert_eq!(
            spec(value).compile().unwrap_err(),
            UiSpecError::DanglingChild {
                parent: "main".into(),
                child: "missing".into()
            }
        );

        let mut value = chase_spec();
        value["root"] = json!("nope");
        assert!(matches!(spec(value).compile(), Err(UiSpecError::MissingRoot(_))));

        let mut value = chase_spec();
        value["elements"]["inner"] = json!({ "type": "Card", "children": ["main"] });
        value["elements"]["main"]["children"] = json!(["inner"]);
        assert!(matches!(spec(value).compile(), Err(UiSpecError::Cycle(_))));

        let mut value = chase_spec();
        value["elements"]["count"]["children"] = json!(["color"]);
        assert!(matches!(
            spec(value).compile(),
            Err(UiSpecError::UnexpectedChildren { .. })
        ));
    }

    #[test]
    fn test_prop_errors() {
        let mut value = chase_spec();
        value["elements"]["count"]["props"]["colour"] = json!("red");
        assert!(matches!(spec(value).compile(), Err(UiSpecError::UnknownProp { .. })));

        let mut value = chase_spec();
        value["elements"]["count"]["props"]
            .as_object_mut()
            .unwrap()
            .remove("label");
        assert!(matches!(spec(value).compile(), Err(UiSpecError::MissingProp { .. })));

        let mut value = chase_spec();
        value["elements"]["count"]["props"]["min"] = json!("one");
        assert!(matches!(spec(value).compile(), Err(UiSpecError::InvalidProp { .. })));

        let mut value = chase_spec();
        value["elements"]["count"]["props"]["value"] = json!({ "$bindState": "effect" });
        assert!(matches!(spec(value).compile(), Err(UiSpecError::InvalidProp { .. })));
    }

    #[test]
    fn test_from_node_tree() {
        let node = json!({
            "type": "Card",
            "props": { "title": "Wave" },
            "children": [
                { "type": "Text", "props": { "text": "Width" } },
                { "type": "CupertinoSlider", "props": {
                    "label": "Width", "min": 1, "max": 10,
                    "value": { "$bindState": "/effect/waveWidth" } } }
            ]
        });
        let spec = UiSpec::from_node_tree(&node, json!({ "effect": { "waveWidth": 5 } })).unwrap();
        assert_eq!(spec.root, "n0");
        assert_eq!(spec.elements["n0"].children, vec!["n1", "n2"]);

        let tree = spec.compile().unwrap();
        assert_eq!(tree.controls().len(), 1);
        assert_eq!(tree.outline()[2], "  CupertinoSlider #n2 [value->/effect/waveWidth]");

        assert!(matches!(
            UiSpec::from_node_tree(&json!([1]), json!({})),
            Err(UiSpecError::Malformed(_))
        ));
    }

    #[test]
    fn test_speed_clamp() {
        let speed = SpeedConfig {
            min: 20,
            max: 300,
            default: 100,
        };
        assert_eq!(speed.clamp(5.0), 20);
        assert_eq!(speed.clamp(120.4), 120);
        assert_eq!(speed.clamp(9000.0), 300);
    }
}
