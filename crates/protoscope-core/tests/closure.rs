//! Schema closure over a realistic protocol document.

use std::path::PathBuf;

use protoscope_core::{
    MemberKind, ProtocolModel, ProtocolSchema, SeedRef, merge_protocols, stable_protocol,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_model() -> ProtocolModel {
    let json = std::fs::read_to_string(fixtures_dir().join("protocol.json"))
        .expect("Failed to read protocol fixture");
    ProtocolModel::from_json(&json).expect("Failed to index protocol fixture")
}

/// `kind Domain.name` for every member, in schema order
fn members(schema: &ProtocolSchema) -> Vec<String> {
    let mut out = Vec::new();
    for domain in &schema.domains {
        for kind in MemberKind::ALL {
            for local in domain.member_names(kind) {
                out.push(format!("{kind} {}.{local}", domain.domain));
            }
        }
    }
    out
}

#[test]
fn test_command_pulls_in_cross_domain_types() {
    let model = load_model();
    let filtered = model
        .filter_protocol(&[SeedRef::command("Network.getCookies")])
        .unwrap();

    assert_eq!(
        members(&filtered),
        vec![
            "command Network.getCookies",
            "type Network.Cookie",
            "type Runtime.Timestamp",
        ]
    );
    let domains: Vec<&str> = filtered.domains.iter().map(|d| d.domain.as_str()).collect();
    assert_eq!(domains, vec!["Network", "Runtime"]);
}

#[test]
fn test_cyclic_previews_visited_once() {
    let model = load_model();
    let filtered = model
        .filter_protocol(&[SeedRef::command("Runtime.evaluate")])
        .unwrap();

    assert_eq!(
        members(&filtered),
        vec![
            "command Runtime.evaluate",
            "type Runtime.RemoteObjectId",
            "type Runtime.RemoteObject",
            "type Runtime.ObjectPreview",
            "type Runtime.PropertyPreview",
        ]
    );
}

#[test]
fn test_event_seed_follows_nested_arrays() {
    let model = load_model();
    let filtered = model
        .filter_protocol(&[SeedRef::event("Debugger.paused")])
        .unwrap();

    let found = members(&filtered);
    for expected in [
        "event Debugger.paused",
        "type Debugger.CallFrame",
        "type Debugger.Location",
        "type Runtime.ScriptId",
        "type Runtime.RemoteObject",
        "type Runtime.PropertyPreview",
    ] {
        assert!(found.contains(&expected.to_string()), "missing {expected}");
    }
    assert!(!found.contains(&"type Debugger.BreakpointId".to_string()));
    assert!(!found.iter().any(|m| m.contains("Network.")));
}

#[test]
fn test_closure_is_idempotent() {
    let model = load_model();
    let seeds = [
        SeedRef::command("Debugger.setBreakpointByUrl"),
        SeedRef::event("Network.requestWillBeSent"),
        SeedRef::event("Page.loadEventFired"),
        SeedRef::ty("Runtime.Timestamp"),
    ];

    let once = model.filter_protocol(&seeds).unwrap();
    let twice = ProtocolModel::new(once.clone())
        .unwrap()
        .filter_protocol(&seeds)
        .unwrap();
    assert_eq!(once, twice);

    // Untouched members stay out
    let found = members(&once);
    assert!(!found.contains(&"command Network.enable".to_string()));
    assert!(!found.contains(&"command Page.reload".to_string()));
    assert!(found.contains(&"type Network.MonotonicTime".to_string()));
}

#[test]
fn test_closure_keeps_schema_metadata() {
    let model = load_model();
    let filtered = model
        .filter_protocol(&[SeedRef::command("Debugger.setBreakpointByUrl")])
        .unwrap();
    assert_eq!(filtered.version, model.schema().version);

    let debugger = &filtered.domains[0];
    assert_eq!(debugger.dependencies.as_deref(), Some(&["Runtime".to_string()][..]));
    let json = filtered.to_json().unwrap();
    assert!(json.contains("\"$ref\": \"BreakpointId\""));
}

#[test]
fn test_stable_subset_then_closure() {
    let model = load_model();
    let stable = stable_protocol(&merge_protocols(model.schema().clone(), []));
    let stable_model = ProtocolModel::new(stable).unwrap();

    assert!(
        stable_model
            .filter_protocol(&[SeedRef::command("Page.captureSnapshot")])
            .is_err()
    );
    assert!(
        stable_model
            .filter_protocol(&[SeedRef::command("Page.reload")])
            .is_ok()
    );
}
