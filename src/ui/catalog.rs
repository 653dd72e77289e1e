// Component catalog
// The fixed vocabulary a control panel may use, with per-component prop schemas

use serde_json::Value;

/// Renderable component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Flex layout container
    Stack,
    /// Bordered container with optional title
    Card,
    /// Labeled numeric slider
    CupertinoSlider,
    /// Hue/saturation/brightness picker with swatch preview
    ColorHSV,
    Text,
}

/// Expected shape of a literal prop value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Number,
    String,
    Enum(&'static [&'static str]),
}

/// One entry of a component's prop schema
#[derive(Debug, Clone, Copy)]
pub struct PropSchema {
    pub name: &'static str,
    pub kind: PropKind,
    pub required: bool,
}

const fn req(name: &'static str, kind: PropKind) -> PropSchema {
    PropSchema {
        name,
        kind,
        required: true,
    }
}

const fn opt(name: &'static str, kind: PropKind) -> PropSchema {
    PropSchema {
        name,
        kind,
        required: false,
    }
}

const STACK_PROPS: &[PropSchema] = &[
    opt("direction", PropKind::Enum(&["vertical", "horizontal"])),
    opt("gap", PropKind::Enum(&["sm", "md", "lg"])),
];

const CARD_PROPS: &[PropSchema] = &[opt("title", PropKind::String)];

const SLIDER_PROPS: &[PropSchema] = &[
    req("label", PropKind::String),
    req("min", PropKind::Number),
    req("max", PropKind::Number),
    opt("step", PropKind::Number),
    opt("value", PropKind::Number),
    opt("unit", PropKind::String),
    opt("minLabel", PropKind::String),
    opt("maxLabel", PropKind::String),
    opt("accentColor", PropKind::String),
];

const COLOR_PROPS: &[PropSchema] = &[
    req("label", PropKind::String),
    opt("hue", PropKind::Number),
    opt("saturation", PropKind::Number),
    opt("brightness", PropKind::Number),
    opt("accentColor", PropKind::String),
];

const TEXT_PROPS: &[PropSchema] = &[
    req("text", PropKind::String),
    opt("variant", PropKind::Enum(&["label", "value", "hint"])),
];

impl Component {
    pub const ALL: [Component; 5] = [
        Self::Stack,
        Self::Card,
        Self::CupertinoSlider,
        Self::ColorHSV,
        Self::Text,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stack => "Stack",
            Self::Card => "Card",
            Self::CupertinoSlider => "CupertinoSlider",
            Self::ColorHSV => "ColorHSV",
            Self::Text => "Text",
        }
    }

    /// Whether the component has a `default` slot for children
    pub fn has_slot(self) -> bool {
        matches!(self, Self::Stack | Self::Card)
    }

    pub fn props(self) -> &'static [PropSchema] {
        match self {
            Self::Stack => STACK_PROPS,
            Self::Card => CARD_PROPS,
            Self::CupertinoSlider => SLIDER_PROPS,
            Self::ColorHSV => COLOR_PROPS,
            Self::Text => TEXT_PROPS,
        }
    }

    pub fn prop(self, name: &str) -> Option<&'static PropSchema> {
        self.props().iter().find(|p| p.name == name)
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl PropKind {
    /// Check a literal value. `null` is accepted for optional props by the caller.
    pub fn check(self, value: &Value) -> Result<(), String> {
        match self {
            Self::Number if value.is_number() => Ok(()),
            Self::Number => Err(format!("expected a number, got {value}")),
            Self::String if value.is_string() => Ok(()),
            Self::String => Err(format!("expected a string, got {value}")),
            Self::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => Ok(()),
                _ => Err(format!("expected one of {allowed:?}, got {value}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup() {
        assert_eq!(Component::from_name("ColorHSV"), Some(Component::ColorHSV));
        assert_eq!(Component::from_name("Button"), None);
        assert!(Component::Card.has_slot());
        assert!(!Component::Text.has_slot());
    }

    #[test]
    fn test_prop_schema() {
        let label = Component::CupertinoSlider.prop("label").unwrap();
        assert!(label.required);
        assert!(Component::CupertinoSlider.prop("color").is_none());

        let gap = Component::Stack.prop("gap").unwrap();
        assert!(gap.kind.check(&json!("md")).is_ok());
        assert!(gap.kind.check(&json!("xl")).is_err());
        assert!(PropKind::Number.check(&json!("3")).is_err());
    }
}
