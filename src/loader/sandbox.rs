// Script sandbox
// A fresh rhai engine per load that only sees explicitly injected values

use rhai::module_resolvers::DummyModuleResolver;
use rhai::plugin::*;
use rhai::{Array, Dynamic, Engine, Map, Scope};
use tracing::{debug, info};

use super::UiMode;

/// Name of the injected host description map
pub const HOST: &str = "host";

/// Name of the injected export placeholder map
pub const EXPORTS: &str = "exports";

/// Namespace of the injected component library (`ui::card(...)`)
pub const UI_MODULE: &str = "ui";

/// Expression nesting allowed at the top level and inside functions.
/// Panel trees nest several component calls deep.
pub const MAX_EXPR_DEPTH: usize = 64;

/// Version of the host API handed to scripts as `host.api`
pub const API_VERSION: i64 = 1;

/// Build a sandboxed engine.
///
/// `import` cannot resolve anything and `eval` is disabled, so a script can
/// only reach the standard library, the `ui` component library and whatever
/// the caller pushes into its [`Scope`].
pub fn engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);

    engine.on_print(|text| info!(target: "effect_script", "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: "effect_script", source = source.unwrap_or("-"), %pos, "{text}")
    });

    engine.register_static_module(UI_MODULE, exported_module!(ui_api).into());
    engine
}

/// Engine that additionally rejects references to undeclared variables
pub fn strict_engine() -> Engine {
    let mut engine = engine();
    engine.set_strict_variables(true);
    engine
}

/// Values visible to the top level of a loaded unit
pub fn scope(effect_id: &str, mode: UiMode) -> Scope<'static> {
    let mut host = Map::new();
    host.insert("effect".into(), effect_id.into());
    host.insert("ui_mode".into(), mode.as_str().into());
    host.insert("api".into(), Dynamic::from_int(API_VERSION));

    let mut scope = Scope::new();
    scope.push_constant(HOST, host);
    scope.push(EXPORTS, Map::new());
    scope
}

fn node(component: &str, props: Map, children: Array) -> Dynamic {
    let mut node = Map::new();
    node.insert("type".into(), component.into());
    node.insert("props".into(), Dynamic::from_map(props));
    node.insert("children".into(), Dynamic::from_array(children));
    Dynamic::from_map(node)
}

/// Component library exposed to panel scripts as `ui::*`
#[export_module]
mod ui_api {
    use rhai::{Array, Dynamic, ImmutableString, Map};

    pub fn stack(props: Map, children: Array) -> Dynamic {
        super::node("Stack", props, children)
    }

    pub fn card(props: Map, children: Array) -> Dynamic {
        super::node("Card", props, children)
    }

    pub fn slider(props: Map) -> Dynamic {
        super::node("CupertinoSlider", props, Array::new())
    }

    pub fn color_hsv(props: Map) -> Dynamic {
        super::node("ColorHSV", props, Array::new())
    }

    pub fn text(props: Map) -> Dynamic {
        super::node("Text", props, Array::new())
    }

    /// Prop bound to a state path: `ui::bind("/effect/speed")`
    pub fn bind(path: ImmutableString) -> Dynamic {
        let mut binding = Map::new();
        binding.insert(crate::ui::BIND_STATE.into(), path.into());
        Dynamic::from_map(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_component_library() {
        let engine = engine();
        let node: Dynamic = engine
            .eval(
                r#"ui::card(#{ title: "Chase" }, [
                    ui::slider(#{ label: "Count", min: 1, max: 10, value: ui::bind("/effect/chaseCount") })
                ])"#,
            )
            .unwrap();
        let node: Value = rhai::serde::from_dynamic(&node).unwrap();
        assert_eq!(node["type"], "Card");
        assert_eq!(node["children"][0]["type"], "CupertinoSlider");
        assert_eq!(
            node["children"][0]["props"]["value"],
            json!({ "$bindState": "/effect/chaseCount" })
        );
    }

    #[test]
    fn test_nested_panel_tree_compiles() {
        let engine = engine();
        assert_eq!(engine.max_expr_depth(), MAX_EXPR_DEPTH);
        assert_eq!(engine.max_function_expr_depth(), MAX_EXPR_DEPTH);

        let script = r#"
            fn render(state) {
                ui::stack(#{ direction: "vertical" }, [
                    ui::card(#{ title: "Color" }, [
                        ui::color_hsv(#{
                            label: "Color",
                            hue: ui::bind("/effect/hue"),
                            saturation: ui::bind("/effect/saturation"),
                            brightness: ui::bind("/effect/brightness")
                        })
                    ]),
                    ui::card(#{ title: "Speed" }, [
                        ui::slider(#{ label: "Speed", min: 30, max: 300, value: ui::bind("/effect/speed") })
                    ])
                ])
            }
        "#;
        let ast = engine.compile(script).unwrap();
        let node: Dynamic = engine.call_fn(&mut Scope::new(), &ast, "render", (Map::new(),)).unwrap();
        let node: Value = rhai::serde::from_dynamic(&node).unwrap();
        assert_eq!(node["children"][0]["children"][0]["type"], "ColorHSV");
    }

    #[test]
    fn test_no_ambient_access() {
        let engine = engine();
        assert!(engine.eval::<Dynamic>(r#"import "fs" as fs; 1"#).is_err());
        assert!(engine.compile(r#"eval("1 + 1")"#).is_err());
    }

    #[test]
    fn test_injected_scope() {
        let engine = engine();
        let mut scope = scope("chase", UiMode::Json);
        let api: i64 = engine
            .eval_with_scope(&mut scope, "exports.factory = \"make\"; host.api")
            .unwrap();
        assert_eq!(api, API_VERSION);

        let exports = scope.get_value::<Map>(EXPORTS).unwrap();
        assert_eq!(exports["factory"].clone().into_string().unwrap(), "make");
        assert!(engine.eval_with_scope::<Dynamic>(&mut scope, "host = 1").is_err());
    }

    #[test]
    fn test_strict_engine_rejects_undeclared() {
        let engine = strict_engine();
        assert!(engine.compile("fn f() { missing + 1 }").is_err());
        assert!(engine.compile("fn f(x) { let y = x; y + 1 }").is_ok());
    }
}
