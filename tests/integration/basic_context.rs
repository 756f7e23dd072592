//! Basic contexts: all-or-nothing rebuilds without association tracking

use super::test_utils::Workspace;
use buildavoid::{BuildError, ResourceStatus};

fn full_build(ws: &Workspace, outputs: &[&str]) {
    let mut ctx = ws.open_basic();
    let input = ctx.register_input(ws.path("a.txt")).unwrap();
    let input = ctx.process(&input).unwrap();
    for output in outputs {
        ws.write(output, "generated");
        ctx.process_output(ws.path(output)).unwrap();
    }
    assert!(matches!(
        ctx.associate_output(&input, ws.path(outputs[0])),
        Err(BuildError::InvalidState(_))
    ));
    ctx.commit().unwrap();
}

#[test]
fn test_nothing_processed_carries_everything() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    full_build(&ws, &["gen/one.out", "gen/two.out"]);

    let mut ctx = ws.open_basic();
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    assert_eq!(meta.status(), ResourceStatus::Unmodified);
    assert!(!ctx.is_processing_required().unwrap());
    ctx.commit().unwrap();
    assert!(ws.exists("gen/one.out"));
    assert!(ws.exists("gen/two.out"));

    // Carried again by the previous idle build.
    let mut ctx = ws.open_basic();
    ctx.register_input(ws.path("a.txt")).unwrap();
    ctx.commit().unwrap();
    assert!(ws.exists("gen/one.out"));
}

#[test]
fn test_rebuild_deletes_outputs_not_produced_again() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    full_build(&ws, &["gen/one.out", "gen/two.out"]);

    ws.write("a.txt", "alpha v2");
    let mut ctx = ws.open_basic();
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    assert_eq!(meta.status(), ResourceStatus::Modified);
    full_build_in(&ws, ctx, &["gen/one.out"]);

    assert!(ws.exists("gen/one.out"));
    assert!(!ws.exists("gen/two.out"));
}

fn full_build_in(ws: &Workspace, mut ctx: buildavoid::BuildContext, outputs: &[&str]) {
    let input = ctx.register_input(ws.path("a.txt")).unwrap();
    ctx.process(&input).unwrap();
    for output in outputs {
        ws.write(output, "generated");
        ctx.process_output(ws.path(output)).unwrap();
    }
    ctx.commit().unwrap();
}

#[test]
fn test_processing_unchanged_input_does_not_require_processing() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    full_build(&ws, &["gen/one.out"]);

    let mut ctx = ws.open_basic();
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    ctx.process(&meta).unwrap();
    ws.write("gen/extra.out", "generated");
    ctx.process_output(ws.path("gen/extra.out")).unwrap();
    assert!(!ctx.is_processing_required().unwrap());
}
