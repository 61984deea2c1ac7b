//! Extraction over whole fixture files, plus navigation lookup.

use funclab_core::{CallableKind, ExtractError, extract, locate};
use funclab_test_utils::fixtures::{ASYNC_TS, BROKEN_TS, COUNTER_TS, MATH_TS};
use funclab_test_utils::workspace::TestWorkspace;
use pretty_assertions::assert_eq;

fn names(source: &str) -> Vec<String> {
    extract(source, "fixture.ts")
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect()
}

#[test]
fn test_n_functions_yield_n_descriptors_in_order() {
    let source: String = (0..12)
        .map(|i| format!("function f{i}(x: number): number {{ return x + {i}; }}\n"))
        .collect();
    let descriptors = extract(&source, "many.ts").unwrap();
    assert_eq!(descriptors.len(), 12);
    for (i, d) in descriptors.iter().enumerate() {
        assert_eq!(d.name, format!("f{i}"));
        assert_eq!(d.span.start_line, i as u32 + 1);
        assert_eq!(d.kind, CallableKind::Function);
    }
}

#[test]
fn test_math_fixture() {
    assert_eq!(names(MATH_TS), vec!["add", "sum", "createMultiplier", "fail"]);

    let descriptors = extract(MATH_TS, "math.ts").unwrap();
    let multiplier = &descriptors[2];
    assert_eq!(multiplier.kind, CallableKind::Binding);
    assert!(multiplier.source_text.starts_with("const createMultiplier"));
    assert!(descriptors[1].is_variadic());
    assert_eq!(descriptors[3].return_type, "never");
}

#[test]
fn test_class_yields_constructor_then_methods() {
    let descriptors = extract(COUNTER_TS, "counter.ts").unwrap();
    let summary: Vec<(String, CallableKind)> =
        descriptors.iter().map(|d| (d.name.clone(), d.kind)).collect();
    assert_eq!(
        summary,
        vec![
            ("Counter".to_string(), CallableKind::Constructor),
            ("Counter.increment".to_string(), CallableKind::Method),
            ("Counter.describe".to_string(), CallableKind::Method),
        ]
    );
    let ctor = &descriptors[0];
    assert_eq!(ctor.return_type, "Counter");
    assert_eq!(ctor.parameters[0].name, "start");
    assert!(ctor.parameters[0].optional);
    for d in &descriptors {
        assert_eq!(d.owner.as_deref(), Some("Counter"));
        assert!(d.source_text.starts_with("class Counter"));
    }
}

#[test]
fn test_async_flags() {
    let flags: Vec<(String, bool)> = extract(ASYNC_TS, "async.ts")
        .unwrap()
        .into_iter()
        .map(|d| (d.name, d.is_async))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("delayed".to_string(), true),
            ("rejects".to_string(), true),
            ("forever".to_string(), false),
        ]
    );
}

#[test]
fn test_syntax_failure_reports_position() {
    funclab_test_utils::tracing_setup::init_test_tracing();
    match extract(BROKEN_TS, "broken.ts").unwrap_err() {
        ExtractError::Syntax { file, line, column } => {
            assert_eq!(file, "broken.ts");
            assert!(line >= 1);
            assert!(column >= 1);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}

#[test]
fn test_deeply_nested_syntax_error_is_reported() {
    let source = format!("function f() {{ return {}1 +; }}", "(".repeat(10_000));
    let err = extract(&source, "deep.ts").unwrap_err();
    assert!(matches!(err, ExtractError::Syntax { line: 1, .. }), "{err:?}");
}

#[test]
fn test_locate_entries() {
    let descriptors = extract(COUNTER_TS, "counter.ts").unwrap();
    assert_eq!(locate(&descriptors, "Counter"), Some(1));
    assert_eq!(locate(&descriptors, "Counter.describe"), Some(13));
    assert_eq!(locate(&descriptors, "Counter.value"), None);
}

#[tokio::test]
async fn test_extract_from_disk() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("lib/math.mjs", "export const twice = (x) => x * 2;\n").await;
    let source = tokio::fs::read_to_string(&path).await.unwrap();
    let descriptors = extract(&source, &path.display().to_string()).unwrap();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].parameters[0].ty, "any");
}
