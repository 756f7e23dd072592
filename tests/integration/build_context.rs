//! Registration, status computation and commit behavior across builds

use super::test_utils::Workspace;
use buildavoid::{AggregatorBuildContext, BuildContext, BuildError, ResourceStatus};
use std::fs;

#[test]
fn test_associate_commit_then_noop_build() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");

    let mut ctx = ws.open();
    assert!(!ctx.is_escalated());
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    assert_eq!(meta.status(), ResourceStatus::Unmodified);
    assert!(ws.exists("a.out"));
    assert_eq!(
        ctx.output_status(ws.path("a.out")).unwrap(),
        ResourceStatus::Unmodified
    );
    assert!(!ctx.is_processing_required().unwrap());
    assert_eq!(ctx.associated_outputs(&meta).unwrap(), vec![ws.path("a.out")]);
    ctx.commit().unwrap();

    assert!(ws.exists("a.out"));
}

#[test]
fn test_reregistration_returns_first_status() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");

    let mut ctx = ws.open();
    let first = ctx.register_input(ws.path("a.txt")).unwrap();
    ws.write("a.txt", "changed behind our back");
    let second = ctx.register_input(ws.path("a.txt")).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.status(), ResourceStatus::Unmodified);
    assert!(matches!(ctx.process(&second), Err(BuildError::InvalidState(_))));
}

#[test]
fn test_relative_and_dotted_paths_share_identity() {
    let ws = Workspace::new();
    ws.write("dir/a.txt", "alpha");

    let mut ctx = ws.open();
    let direct = ctx.register_input(ws.path("dir/a.txt")).unwrap();
    let dotted = ctx.register_input(ws.path("dir/../dir/./a.txt")).unwrap();
    assert_eq!(direct.resource(), dotted.resource());
    assert_eq!(ctx.registered_inputs().unwrap().len(), 1);
}

#[test]
fn test_status_tracks_content_changes() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.write("b.txt", "beta");
    let mut ctx = ws.open();
    ctx.register_and_process([ws.path("a.txt"), ws.path("b.txt")])
        .unwrap();
    ctx.commit().unwrap();

    ws.write("a.txt", "alpha v2");
    ws.write("c.txt", "gamma");

    let mut ctx = ws.open();
    let a = ctx.register_input(ws.path("a.txt")).unwrap();
    let b = ctx.register_input(ws.path("b.txt")).unwrap();
    let c = ctx.register_input(ws.path("c.txt")).unwrap();
    assert_eq!(a.status(), ResourceStatus::Modified);
    assert_eq!(b.status(), ResourceStatus::Unmodified);
    assert_eq!(c.status(), ResourceStatus::New);
    assert_eq!(
        ctx.input_status(ws.path("c.txt")).unwrap(),
        Some(ResourceStatus::New)
    );
    assert_eq!(ctx.input_status(ws.path("zzz.txt")).unwrap(), None);
}

#[test]
fn test_changed_output_makes_input_modified() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");

    ws.write("a.out", "tampered");
    let mut ctx = ws.open();
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    assert_eq!(meta.status(), ResourceStatus::Modified);
    assert_eq!(
        ctx.output_status(ws.path("a.out")).unwrap(),
        ResourceStatus::Modified
    );
}

#[test]
fn test_removed_output_makes_input_modified() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");

    ws.remove("a.out");
    let mut ctx = ws.open();
    assert_eq!(
        ctx.output_status(ws.path("a.out")).unwrap(),
        ResourceStatus::Removed
    );
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    assert_eq!(meta.status(), ResourceStatus::Modified);
}

#[test]
fn test_output_with_new_producer_is_modified() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.write("b.txt", "beta");
    ws.build_one("a.txt", "out.txt");

    let mut ctx = ws.open();
    ctx.register_input(ws.path("a.txt")).unwrap();
    let b = ctx.register_input(ws.path("b.txt")).unwrap();
    let b = ctx.process(&b).unwrap();
    ctx.associate_output(&b, ws.path("out.txt")).unwrap();
    assert_eq!(
        ctx.output_status(ws.path("out.txt")).unwrap(),
        ResourceStatus::Modified
    );
}

#[test]
fn test_included_input_change_invalidates_owner() {
    let ws = Workspace::new();
    ws.write("main.c", "#include \"defs.h\"");
    ws.write("defs.h", "#define X 1");

    let mut ctx = ws.open();
    let meta = ctx.register_input(ws.path("main.c")).unwrap();
    let main = ctx.process(&meta).unwrap();
    ctx.associate_included_input(&main, ws.path("defs.h")).unwrap();
    ws.write("main.o", "object");
    ctx.associate_output(&main, ws.path("main.o")).unwrap();
    ctx.commit().unwrap();

    let mut ctx = ws.open();
    assert_eq!(
        ctx.register_input(ws.path("main.c")).unwrap().status(),
        ResourceStatus::Unmodified
    );
    ctx.commit().unwrap();

    ws.write("defs.h", "#define X 2");
    let mut ctx = ws.open();
    assert_eq!(
        ctx.register_input(ws.path("main.c")).unwrap().status(),
        ResourceStatus::Modified
    );
}

#[test]
fn test_register_inputs_with_patterns() {
    let ws = Workspace::new();
    ws.write("src/a.txt", "a");
    ws.write("src/nested/b.txt", "b");
    ws.write("src/c.bin", "c");
    ws.write("src/skip/d.txt", "d");

    let mut ctx = ws.open();
    let registered = ctx
        .register_inputs(&ws.path("src"), ["**/*.txt"], ["skip/"])
        .unwrap();
    let names: Vec<_> = registered
        .iter()
        .map(|m| m.resource().to_path_buf())
        .collect();
    assert_eq!(names, vec![ws.path("src/a.txt"), ws.path("src/nested/b.txt")]);

    let none = ctx
        .register_inputs(&ws.path("missing"), ["**"], Vec::<String>::new())
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_register_and_process_skips_unmodified() {
    let ws = Workspace::new();
    ws.write("src/a.txt", "a");
    ws.write("src/b.txt", "b");

    let mut ctx = ws.open();
    let first = ctx
        .register_and_process_inputs(&ws.path("src"), ["*.txt"], Vec::<String>::new())
        .unwrap();
    assert_eq!(first.len(), 2);
    ctx.commit().unwrap();

    ws.write("src/b.txt", "b2");
    let mut ctx = ws.open();
    let second = ctx
        .register_and_process_inputs(&ws.path("src"), ["*.txt"], Vec::<String>::new())
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].resource(), ws.path("src/b.txt"));
    assert!(ctx.is_processing_required().unwrap());
}

#[test]
fn test_removed_inputs_reported() {
    let ws = Workspace::new();
    ws.write("a.txt", "a");
    ws.write("b.txt", "b");
    let mut ctx = ws.open();
    ctx.register_and_process([ws.path("a.txt"), ws.path("b.txt")])
        .unwrap();
    ctx.commit().unwrap();

    let mut ctx = ws.open();
    ctx.register_input(ws.path("a.txt")).unwrap();
    assert_eq!(ctx.removed_inputs().unwrap(), vec![ws.path("b.txt")]);
    let registered = ctx.registered_inputs().unwrap();
    assert_eq!(registered.len(), 2);
    let removed = registered
        .iter()
        .find(|m| m.resource() == ws.path("b.txt"))
        .unwrap();
    assert_eq!(removed.status(), ResourceStatus::Removed);
    assert!(ctx.is_processing_required().unwrap());
}

#[test]
fn test_unprocessed_modified_input_stays_pending() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");

    ws.write("a.txt", "alpha v2");
    let mut ctx = ws.open();
    assert_eq!(
        ctx.register_input(ws.path("a.txt")).unwrap().status(),
        ResourceStatus::Modified
    );
    ctx.commit().unwrap();
    assert!(ws.exists("a.out"));

    let mut ctx = ws.open();
    assert_eq!(
        ctx.register_input(ws.path("a.txt")).unwrap().status(),
        ResourceStatus::Modified
    );
}

#[test]
fn test_input_changed_before_commit_is_invalid_state() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    let mut ctx = ws.open();
    ctx.register_input(ws.path("a.txt")).unwrap();
    ws.write("a.txt", "changed");

    assert!(matches!(ctx.commit(), Err(BuildError::InvalidState(_))));
    assert!(!ws.state_file().exists());
}

#[test]
fn test_skip_execution_keeps_previous_state() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");
    let before = fs::read(ws.state_file()).unwrap();

    ws.write("a.txt", "alpha v2");
    let mut ctx = ws.open();
    assert_eq!(
        ctx.register_input(ws.path("a.txt")).unwrap().status(),
        ResourceStatus::Modified
    );
    ctx.mark_skip_execution().unwrap();
    ctx.commit().unwrap();

    assert!(ws.exists("a.out"));
    assert_eq!(fs::read(ws.state_file()).unwrap(), before);

    let mut ctx = ws.open();
    assert_eq!(
        ctx.register_input(ws.path("a.txt")).unwrap().status(),
        ResourceStatus::Modified
    );
}

#[test]
fn test_processing_required_after_processing_unmodified_input() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.build_one("a.txt", "a.out");

    let mut ctx = ws.open();
    let meta = ctx.register_input(ws.path("a.txt")).unwrap();
    assert!(!ctx.is_processing_required().unwrap());
    ctx.process(&meta).unwrap();
    assert!(ctx.is_processing_required().unwrap());
}

#[test]
fn test_contexts_are_send() {
    fn assert_send<T: Send>() {}
    assert_send::<BuildContext>();
    assert_send::<AggregatorBuildContext>();
}
