//! Capability/requirement index for cross-input dependencies

use super::test_utils::Workspace;
use buildavoid::ResourceStatus;

/// `api.txt` provides `type:Api`, `client.txt` requires it.
fn declare(ws: &Workspace) {
    ws.write("api.txt", "interface Api");
    ws.write("client.txt", "uses Api");
    let mut ctx = ws.open();
    let api = ctx.register_input(ws.path("api.txt")).unwrap();
    let client = ctx.register_input(ws.path("client.txt")).unwrap();
    let api = ctx.process(&api).unwrap();
    let client = ctx.process(&client).unwrap();
    ctx.add_capability(&api, "type", "Api").unwrap();
    ctx.add_requirement(&client, "type", "Api").unwrap();
    ctx.commit().unwrap();
}

#[test]
fn test_dependents_of_changed_capability() {
    let ws = Workspace::new();
    declare(&ws);

    ws.write("api.txt", "interface Api { changed }");
    let mut ctx = ws.open();
    let api = ctx.register_input(ws.path("api.txt")).unwrap();
    let client = ctx.register_input(ws.path("client.txt")).unwrap();
    assert_eq!(api.status(), ResourceStatus::Modified);
    assert_eq!(client.status(), ResourceStatus::Unmodified);

    let dependents = ctx.get_dependent_inputs("type", "Api").unwrap();
    assert_eq!(dependents, vec![client]);
    assert!(ctx.get_dependent_inputs("type", "Other").unwrap().is_empty());
}

#[test]
fn test_dependents_limited_to_registered_inputs() {
    let ws = Workspace::new();
    declare(&ws);

    let mut ctx = ws.open();
    ctx.register_input(ws.path("api.txt")).unwrap();
    assert!(ctx.get_dependent_inputs("type", "Api").unwrap().is_empty());
}

#[test]
fn test_providers_from_both_generations() {
    let ws = Workspace::new();
    declare(&ws);
    ws.write("api2.txt", "interface Api v2");

    let mut ctx = ws.open();
    ctx.register_input(ws.path("api.txt")).unwrap();
    let second = ctx.register_input(ws.path("api2.txt")).unwrap();
    let second = ctx.process(&second).unwrap();
    ctx.add_capability(&second, "type", "Api").unwrap();

    assert_eq!(
        ctx.capability_providers("type", "Api").unwrap(),
        vec![ws.path("api.txt"), ws.path("api2.txt")]
    );
}

#[test]
fn test_reprocessed_provider_without_capability_is_dropped() {
    let ws = Workspace::new();
    declare(&ws);

    ws.write("api.txt", "no longer an interface");
    let mut ctx = ws.open();
    let api = ctx.register_input(ws.path("api.txt")).unwrap();
    ctx.process(&api).unwrap();
    assert!(ctx.capability_providers("type", "Api").unwrap().is_empty());
}

#[test]
fn test_index_carried_for_unprocessed_inputs() {
    let ws = Workspace::new();
    declare(&ws);

    let mut ctx = ws.open();
    ctx.register_input(ws.path("api.txt")).unwrap();
    ctx.register_input(ws.path("client.txt")).unwrap();
    ctx.commit().unwrap();

    let mut ctx = ws.open();
    let client = ctx.register_input(ws.path("client.txt")).unwrap();
    ctx.register_input(ws.path("api.txt")).unwrap();
    assert_eq!(ctx.get_dependent_inputs("type", "Api").unwrap(), vec![client]);
    assert_eq!(
        ctx.capability_providers("type", "Api").unwrap(),
        vec![ws.path("api.txt")]
    );
}

#[test]
fn test_removed_input_leaves_index() {
    let ws = Workspace::new();
    declare(&ws);

    ws.remove("client.txt");
    let mut ctx = ws.open();
    ctx.register_input(ws.path("api.txt")).unwrap();
    ctx.commit().unwrap();

    ws.write("client.txt", "uses Api");
    let mut ctx = ws.open();
    ctx.register_input(ws.path("client.txt")).unwrap();
    assert!(ctx.get_dependent_inputs("type", "Api").unwrap().is_empty());
}
