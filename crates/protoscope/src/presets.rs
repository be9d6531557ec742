//! Built-in implementation conventions
//!
//! These describe how the Hermes and React Native inspector sources name
//! protocol symbols, so they can be cross-referenced without writing a
//! convention by hand.

use std::collections::BTreeMap;

use protoscope_core::{Convention, NeedleRule, RepoSpec, SnapshotScope, SubsetSpec};

pub const HERMES: &str = "hermes";
pub const HERMES_LEGACY: &str = "hermes-legacy";
pub const REACT_NATIVE: &str = "react-native";
pub const REACT_NATIVE_HERMES: &str = "react-native-hermes";

/// Names accepted by [`preset`]
pub const PRESETS: &[&str] = &[HERMES, HERMES_LEGACY, REACT_NATIVE];

const COMMAND_NEEDLES: [&str; 3] = [
    "m::{domainCamel}::{memberPascal}Request",
    "m::{domainCamel}::{memberPascal}Response",
    "{wire}",
];
const EVENT_NEEDLES: [&str; 2] = ["m::{domainCamel}::{memberPascal}Notification", "{wire}"];
const TYPE_NEEDLES: [&str; 1] = ["{domainCamel}::{memberPascal}"];

const CDP_HANDLER_CPP: &str = "API/hermes/inspector/chrome/CDPHandler.cpp";
const MESSAGE_TYPES_H: &str = "API/hermes/inspector/chrome/MessageTypes.h";

/// Look up a built-in convention by name
pub fn preset(name: &str) -> Option<Convention> {
    match name {
        HERMES => Some(hermes()),
        HERMES_LEGACY => Some(hermes_legacy()),
        REACT_NATIVE => Some(react_native()),
        _ => None,
    }
}

fn subset(include: &[&str], exclude: &[&str]) -> SubsetSpec {
    SubsetSpec {
        include: include.iter().map(|s| s.to_string()).collect(),
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
    }
}

fn cpp_sources(root: &str) -> SnapshotScope {
    SnapshotScope {
        roots: vec![root.to_string()],
        files: vec![],
        extensions: vec!["cpp".to_string(), "h".to_string()],
    }
}

/// Modern Hermes CDP agents; generated message types live beside them
pub fn hermes() -> Convention {
    let message = ["**/Message*", "**/Message*/**"];
    Convention {
        display_name: "Hermes".to_string(),
        repo: RepoSpec::new("facebook", "hermes", "main"),
        scope: cpp_sources("API/hermes/cdp"),
        subsets: BTreeMap::from([
            ("agent".to_string(), subset(&[], &message)),
            ("codegen".to_string(), subset(&message, &[])),
        ]),
        commands: Some(NeedleRule::new("agent", COMMAND_NEEDLES)),
        events: Some(NeedleRule::new("agent", EVENT_NEEDLES)),
        types: Some(NeedleRule::new("codegen", TYPE_NEEDLES)),
        comments: vec!["agent".to_string()],
    }
}

/// The single-file Hermes inspector that predates the CDP agents
pub fn hermes_legacy() -> Convention {
    Convention {
        display_name: "Hermes (CDPHandler)".to_string(),
        repo: RepoSpec::new("facebook", "hermes", "main"),
        scope: SnapshotScope {
            roots: vec![],
            files: vec![CDP_HANDLER_CPP.to_string(), MESSAGE_TYPES_H.to_string()],
            extensions: vec![],
        },
        subsets: BTreeMap::from([
            ("handler".to_string(), subset(&[CDP_HANDLER_CPP], &[])),
            ("messageTypes".to_string(), subset(&[MESSAGE_TYPES_H], &[])),
        ]),
        commands: Some(NeedleRule::new("handler", COMMAND_NEEDLES)),
        events: Some(NeedleRule::new("handler", EVENT_NEEDLES)),
        types: Some(NeedleRule::new("messageTypes", TYPE_NEEDLES)),
        comments: vec![],
    }
}

/// React Native's modern inspector; dispatches on wire method names
pub fn react_native() -> Convention {
    Convention {
        display_name: "React Native".to_string(),
        repo: RepoSpec::new("facebook", "react-native", "main"),
        scope: cpp_sources("packages/react-native/ReactCommon/jsinspector-modern"),
        subsets: BTreeMap::new(),
        commands: Some(NeedleRule::new("all", ["{wire}"])),
        events: Some(NeedleRule::new("all", ["{wire}"])),
        types: None,
        comments: vec!["all".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protoscope_core::{MemberKind, PathFilter};

    #[test]
    fn test_presets_compile() {
        for name in PRESETS {
            let convention = preset(name).unwrap();
            let subsets = convention.compile_subsets().unwrap();
            for kind in MemberKind::ALL {
                if let Some(rule) = convention.rule(kind) {
                    assert!(subsets.contains_key(&rule.subset), "{name}: {kind}");
                }
            }
        }
        assert!(preset("chromium").is_none());
    }

    #[test]
    fn test_hermes_subsets_split_codegen() {
        let subsets = hermes().compile_subsets().unwrap();
        let agent: &PathFilter = &subsets["agent"];
        let codegen = &subsets["codegen"];

        for path in [
            "API/hermes/cdp/MessageTypes.h",
            "API/hermes/cdp/MessageInterfaces.h",
            "API/hermes/cdp/MessageTypes/Runtime.h",
        ] {
            assert!(codegen.matches(path), "{path}");
            assert!(!agent.matches(path), "{path}");
        }
        assert!(agent.matches("API/hermes/cdp/RuntimeDomainAgent.cpp"));
        assert!(!codegen.matches("API/hermes/cdp/RuntimeDomainAgent.cpp"));
    }

    #[test]
    fn test_hermes_needles() {
        let rule = hermes().commands.unwrap();
        assert_eq!(
            rule.expand("HeapProfiler", "takeHeapSnapshot"),
            vec![
                "m::heapProfiler::TakeHeapSnapshotRequest",
                "m::heapProfiler::TakeHeapSnapshotResponse",
                "\"HeapProfiler.takeHeapSnapshot\"",
            ]
        );
        let types = hermes_legacy().types.unwrap();
        assert_eq!(types.expand("Runtime", "RemoteObject"), vec!["runtime::RemoteObject"]);
    }
}
