//! Engine tests: lifecycle, configuration, validation and execution

use std::collections::HashMap;

use serde_json::json;

use crate::core::options::OptionValue;
use crate::runtime::block::{BlockError, BlockSettings};
use crate::runtime::engine::{Engine, EngineConfig, EngineError};
use crate::tests::example_components::{add, failing, passthrough, scale, shrink};

fn arithmetic_engine() -> Engine {
    let mut engine = Engine::new();
    engine.declare_stages(["foo", "bar", "boo"]).unwrap();
    engine
        .set_block_components("foo", vec![add(), scale(), shrink()], BlockSettings::new())
        .unwrap();
    engine
        .set_block_components(
            "bar",
            vec![add(), scale(), shrink()],
            BlockSettings::new().multiple(true),
        )
        .unwrap();
    engine
        .set_block_components(
            "boo",
            vec![add(), scale(), shrink()],
            BlockSettings::new().multiple(true).in_names(["foo"]),
        )
        .unwrap();
    engine
}

// ── Stage declaration ───────────────────────────────────────────────────

#[test]
fn declaring_zero_stages_fails() {
    let mut engine = Engine::new();
    let err = engine.declare_stages(Vec::<String>::new()).unwrap_err();
    assert!(matches!(err, EngineError::Lifecycle(_)));
}

#[test]
fn declaring_stages_twice_fails() {
    let mut engine = Engine::new();
    engine.declare_stages(["a", "b"]).unwrap();
    let err = engine.declare_stages(["c"]).unwrap_err();
    assert!(matches!(err, EngineError::Lifecycle(_)));
    assert_eq!(engine.stage_names(), vec!["a", "b"]);
}

#[test]
fn duplicate_stage_names_fail() {
    let mut engine = Engine::new();
    let err = engine.declare_stages(["a", "b", "a"]).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateStage(_)));
    assert!(engine.is_empty());
}

#[test]
fn whitespace_stage_names_fail() {
    let mut engine = Engine::new();
    let err = engine.declare_stages(["a b"]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Block(BlockError::InvalidName(_))
    ));
}

#[test]
fn declaration_order_is_preserved() {
    let engine = arithmetic_engine();
    assert_eq!(engine.stage_names(), vec!["foo", "bar", "boo"]);
    assert_eq!(engine.len(), 3);
    assert!(engine.contains("bar"));
    assert!(!engine.contains("baz"));
}

// ── Block access and population ─────────────────────────────────────────

#[test]
fn block_access_checks_the_stage_name() {
    let mut engine = arithmetic_engine();
    assert!(engine.block("foo").is_ok());
    assert!(matches!(
        engine.block("nope").unwrap_err(),
        EngineError::UnknownStage(_)
    ));
    assert!(matches!(
        engine.block_mut("nope").unwrap_err(),
        EngineError::UnknownStage(_)
    ));
}

#[test]
fn set_block_components_requires_a_declared_stage() {
    let mut engine = arithmetic_engine();
    let err = engine
        .set_block_components("nope", vec![add()], BlockSettings::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownStage(_)));
}

#[test]
fn set_block_components_replaces_the_registry() {
    let mut engine = arithmetic_engine();
    engine
        .set_block_components(
            "foo",
            vec![shrink()],
            BlockSettings::new().defaults(["shrink"]),
        )
        .unwrap();
    let block = engine.block("foo").unwrap();
    assert_eq!(block.component_names(), vec!["shrink"]);
    assert_eq!(block.defaults(), ["shrink"]);
}

#[test]
fn direct_registration_through_block_mut() {
    let mut engine = Engine::new();
    engine.declare_stages(["only"]).unwrap();
    engine.block_mut("only").unwrap().register(add(), true).unwrap();
    assert_eq!(engine.block("only").unwrap().defaults(), ["add"]);
}

// ── Configuration ───────────────────────────────────────────────────────

#[test]
fn configure_rejects_unknown_stage_keys() {
    let mut engine = arithmetic_engine();
    let err = engine
        .configure_json(json!({ "nope": [{ "name": "add" }] }))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownStage(_)));
}

#[test]
fn configure_rejects_selections_for_hidden_stages() {
    let mut engine = arithmetic_engine();
    engine
        .block_mut("bar")
        .unwrap()
        .configure(BlockSettings::new().hidden(true).required(false))
        .unwrap();

    let err = engine
        .configure_json(json!({ "bar": [{ "name": "scale" }] }))
        .unwrap_err();
    assert!(matches!(err, EngineError::ForbiddenConfig(_)));

    // an explicitly empty list is fine
    engine.configure_json(json!({ "bar": [] })).unwrap();
}

#[test]
fn configure_rejects_empty_requests_for_required_stages() {
    let mut engine = arithmetic_engine();
    let err = engine.configure_json(json!({ "foo": [] })).unwrap_err();
    assert!(matches!(err, EngineError::MissingSelection(_)));

    // omitting the stage entirely is fine: defaults apply
    engine.configure_json(json!({})).unwrap();
    engine.validate().unwrap();
}

#[test]
fn configure_rejects_multiple_requests_for_single_stages() {
    let mut engine = arithmetic_engine();
    let err = engine
        .configure_json(json!({ "foo": [{ "name": "add" }, { "name": "scale" }] }))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::TooManySelections { given: 2, .. }
    ));
}

#[test]
fn configure_rejects_unknown_components() {
    let mut engine = arithmetic_engine();
    let err = engine
        .configure_json(json!({ "foo": [{ "name": "nope" }] }))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Block(BlockError::UnknownComponent { .. })
    ));
}

#[test]
fn configure_rejects_bad_option_values() {
    let mut engine = arithmetic_engine();
    let err = engine
        .configure_json(json!({ "foo": [{ "name": "add", "options": { "val": "many" } }] }))
        .unwrap_err();
    assert!(matches!(err, EngineError::Block(BlockError::Option { .. })));
}

#[test]
fn configure_is_atomic() {
    let mut engine = arithmetic_engine();
    engine
        .configure_json(json!({ "foo": [{ "name": "scale" }] }))
        .unwrap();
    assert_eq!(engine.block("foo").unwrap().selected(), ["scale"]);

    // one bad stage in the map leaves every selection untouched
    let err = engine
        .configure_json(json!({
            "foo": [{ "name": "add" }],
            "boo": [{ "name": "nope" }],
        }))
        .unwrap_err();
    assert!(matches!(err, EngineError::Block(_)));
    assert_eq!(engine.block("foo").unwrap().selected(), ["scale"]);
}

#[test]
fn configure_resets_previous_state_before_applying() {
    let mut engine = arithmetic_engine();
    engine
        .configure_json(json!({ "foo": [{ "name": "add", "options": { "val": 9 } }] }))
        .unwrap();
    engine
        .configure_json(json!({ "bar": [{ "name": "shrink" }] }))
        .unwrap();

    // foo's earlier selection and option values are gone
    let foo = engine.block("foo").unwrap();
    assert!(foo.selected().is_empty());
    assert_eq!(
        foo.component("add").unwrap().options().unwrap().value("val"),
        Some(&OptionValue::Integer(1))
    );
    assert_eq!(engine.block("bar").unwrap().selected(), ["shrink"]);
}

#[test]
fn configure_normalizes_a_bare_object_to_one_request() {
    let mut engine = arithmetic_engine();
    engine
        .configure_json(json!({ "foo": { "name": "scale" } }))
        .unwrap();
    assert_eq!(engine.block("foo").unwrap().selected(), ["scale"]);
}

#[test]
fn configure_rejects_malformed_payloads() {
    let mut engine = arithmetic_engine();
    let err = engine.configure_json(json!({ "foo": 42 })).unwrap_err();
    assert!(matches!(err, EngineError::MalformedConfig(_)));

    let err = engine
        .configure_json(json!({ "foo": [{ "options": {} }] }))
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedConfig(_)));
}

// ── Validation ──────────────────────────────────────────────────────────

#[test]
fn validate_requires_stages() {
    let engine = Engine::new();
    assert!(matches!(engine.validate().unwrap_err(), EngineError::NoStages));
}

#[test]
fn validate_propagates_block_failures() {
    let mut engine = Engine::new();
    engine.declare_stages(["empty"]).unwrap();
    let err = engine.validate().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Block(BlockError::NoSelection(_))
    ));
}

#[test]
fn validate_rejects_missing_inputs() {
    let mut engine = Engine::new();
    engine.declare_stages(["a", "b"]).unwrap();
    engine
        .set_block_components("a", vec![passthrough("id")], BlockSettings::new())
        .unwrap();
    engine
        .set_block_components(
            "b",
            vec![passthrough("id")],
            BlockSettings::new().in_names(["nope"]),
        )
        .unwrap();

    let err = engine.validate().unwrap_err();
    match err {
        EngineError::MissingInput { stage, input } => {
            assert_eq!(stage, "b");
            assert_eq!(input, "nope");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn validate_rejects_unreliable_inputs() {
    let mut engine = Engine::new();
    engine.declare_stages(["a", "b", "c"]).unwrap();
    engine
        .set_block_components("a", vec![passthrough("id")], BlockSettings::new())
        .unwrap();
    engine
        .set_block_components(
            "b",
            vec![passthrough("id")],
            BlockSettings::new().required(false).out_name("maybe"),
        )
        .unwrap();
    engine
        .set_block_components(
            "c",
            vec![passthrough("id")],
            BlockSettings::new().in_names(["maybe"]),
        )
        .unwrap();

    let err = engine.validate().unwrap_err();
    assert!(matches!(err, EngineError::UnreliableInput { .. }));
}

#[test]
fn validate_accepts_inputs_with_a_required_producer() {
    let mut engine = Engine::new();
    engine.declare_stages(["a", "b", "c"]).unwrap();
    engine
        .set_block_components(
            "a",
            vec![passthrough("id")],
            BlockSettings::new().out_name("data"),
        )
        .unwrap();
    engine
        .set_block_components(
            "b",
            vec![passthrough("id")],
            BlockSettings::new().required(false).out_name("data"),
        )
        .unwrap();
    engine
        .set_block_components(
            "c",
            vec![passthrough("id")],
            BlockSettings::new().in_names(["data"]),
        )
        .unwrap();

    engine.validate().unwrap();
}

#[test]
fn validate_seeds_only_the_first_declared_input() {
    let mut engine = Engine::new();
    engine.declare_stages(["a"]).unwrap();
    engine
        .set_block_components(
            "a",
            vec![passthrough("id")],
            BlockSettings::new().in_names(["graph"]),
        )
        .unwrap();
    engine.validate().unwrap();

    let mut engine = Engine::new();
    engine.declare_stages(["a"]).unwrap();
    engine
        .set_block_components(
            "a",
            vec![passthrough("id")],
            BlockSettings::new().in_names(["graph", "extra"]),
        )
        .unwrap();
    let err = engine.validate().unwrap_err();
    assert!(matches!(
        err,
        EngineError::MissingInput { input, .. } if input == "extra"
    ));
}

// ── Introspection ───────────────────────────────────────────────────────

#[test]
fn describe_skips_hidden_stages_and_keeps_order() {
    let mut engine = arithmetic_engine();
    engine
        .block_mut("bar")
        .unwrap()
        .configure(BlockSettings::new().hidden(true).required(false))
        .unwrap();

    let descriptors = engine.describe();
    let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["foo", "boo"]);
}

// ── Execution ───────────────────────────────────────────────────────────

#[test]
fn play_threads_named_data_between_blocks() {
    let mut engine = arithmetic_engine();
    engine
        .configure_json(json!({
            "foo": [{ "name": "add", "options": { "val": 2 } }],
            "bar": [{ "name": "scale" }],
            "boo": [{ "name": "scale" }, { "name": "shrink" }],
        }))
        .unwrap();

    let result = engine.play(json!(4)).unwrap();
    assert_eq!(result.outputs["input"], json!(4));
    assert_eq!(result.outputs["foo"], json!(6.0));
    assert_eq!(result.outputs["bar"], json!(12.0));
    assert_eq!(result.outputs["boo"], json!(5.0));
    assert!(!result.failed());
    assert_eq!(result.reports.len(), 3);
    assert!(result.total_ms >= 0.0);
}

#[test]
fn play_does_not_mutate_selections() {
    let mut engine = arithmetic_engine();
    engine
        .configure_json(json!({ "foo": [{ "name": "scale" }] }))
        .unwrap();
    engine.play(json!(1)).unwrap();
    assert_eq!(engine.block("foo").unwrap().selected(), ["scale"]);
}

#[test]
fn each_play_gets_its_own_run_id() {
    let mut engine = arithmetic_engine();
    let first = engine.play(json!(1)).unwrap();
    let second = engine.play(json!(1)).unwrap();
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn play_block_runs_a_single_stage() {
    let mut engine = arithmetic_engine();
    engine
        .configure_json(json!({ "bar": [{ "name": "scale" }, { "name": "shrink" }] }))
        .unwrap();
    let value = engine.play_block("bar", &[json!(10)]).unwrap();
    assert_eq!(value, json!(9.0));

    assert!(matches!(
        engine.play_block("nope", &[json!(1)]).unwrap_err(),
        EngineError::UnknownStage(_)
    ));
}

#[test]
fn empty_config_map_type_also_works() {
    // the typed entry point behaves like the JSON one
    let mut engine = arithmetic_engine();
    let config: EngineConfig = HashMap::new();
    engine.configure(&config).unwrap();
    engine.validate().unwrap();
}

#[test]
fn failed_stage_still_contributes_an_output() {
    let mut engine = Engine::new();
    engine.declare_stages(["first", "second", "third"]).unwrap();
    engine
        .set_block_components("first", vec![scale()], BlockSettings::new())
        .unwrap();
    engine
        .set_block_components(
            "second",
            vec![scale(), failing("broken"), shrink()],
            BlockSettings::new().multiple(true),
        )
        .unwrap();
    engine
        .set_block_components("third", vec![scale()], BlockSettings::new())
        .unwrap();
    engine
        .configure_json(json!({
            "second": [{ "name": "scale" }, { "name": "broken" }, { "name": "shrink" }],
        }))
        .unwrap();

    let result = engine.play(json!(1)).unwrap();
    // first: 1*2; second: scale succeeds (4.0) then breaks; third: 4*2
    assert_eq!(result.outputs["first"], json!(2.0));
    assert_eq!(result.outputs["second"], json!(4.0));
    assert_eq!(result.outputs["third"], json!(8.0));
    assert!(result.failed());
    assert!(result.reports["second"].failed);
    assert!(!result.reports["third"].failed);
}

#[test]
fn run_trace_serializes() {
    let mut engine = arithmetic_engine();
    let result = engine.play(json!(2)).unwrap();
    let trace = serde_json::to_value(&result).unwrap();
    assert!(trace["reports"]["foo"]["components"].is_array());
    assert!(trace["outputs"]["input"].is_number());
    assert!(trace["run_id"].is_string());
}
