//! Common test utilities.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const RUNTIME_AGENT: &str = r#"#include "RuntimeDomainAgent.h"

void RuntimeDomainAgent::evaluate(const m::runtime::EvaluateRequest &req) {
  m::runtime::EvaluateResponse resp;
}

// @cdp Runtime.consoleAPICalled
// Buffered until the client enables the domain.
void RuntimeDomainAgent::consoleAPICalled() {}
"#;

pub const MESSAGE_TYPES: &str = "struct runtime::RemoteObject {};\n";

pub const HOST_AGENT: &str = r#"// @cdp Network.getCookies Not forwarded to the host yet.
bool HostAgent::handleRequest(const cdp::PreparsedRequest &req) {
  if (req.method == "Page.reload") {
    return true;
  }
  return false;
}
"#;

pub const CONFIG: &str = r#"implementations:
  - id: hermes
    preset: hermes
    checkout: ../../hermes
  - id: rn
    preset: react-native
    checkout: ../../react-native
  - id: both
    merge: [rn, hermes]
"#;

/// Path to the protocol fixture shared with protoscope-core.
pub fn protocol_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../protoscope-core/tests/fixtures/protocol.json")
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().expect("path has a parent"))
        .expect("Failed to create directory");
    std::fs::write(path, content).expect("Failed to write file");
}

/// Write a Hermes-style checkout below `root`.
pub fn write_hermes_checkout(root: &Path) {
    write(&root.join("API/hermes/cdp/RuntimeDomainAgent.cpp"), RUNTIME_AGENT);
    write(&root.join("API/hermes/cdp/MessageTypes.h"), MESSAGE_TYPES);
}

/// Create a temporary project with a config, two checkouts and a schema.
pub fn create_temp_project() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");

    write(&temp.path().join(".config/protoscope/config.yaml"), CONFIG);
    write_hermes_checkout(&temp.path().join("hermes"));
    write(
        &temp
            .path()
            .join("react-native/packages/react-native/ReactCommon/jsinspector-modern/HostAgent.cpp"),
        HOST_AGENT,
    );
    std::fs::copy(protocol_fixture(), temp.path().join("protocol.json"))
        .expect("Failed to copy protocol.json");

    temp
}
