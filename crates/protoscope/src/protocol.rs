//! Protocol schemas read from local JSON files

use std::path::PathBuf;
use std::sync::Arc;

use protoscope_core::{
    Error, FetchError, ProtocolSchema, ProtocolVersion, VersionMetadata, merge_protocols,
    stable_protocol,
};

/// A protocol version built from schema files, merged in the order given.
///
/// Nothing is read until the version's model is first requested.
pub fn local_version(paths: Vec<PathBuf>, stable: bool) -> ProtocolVersion {
    let (slug, name) = if stable {
        ("stable", "Stable")
    } else {
        ("tot", "Tip-of-tree")
    };
    let metadata = VersionMetadata {
        slug: slug.to_string(),
        name: name.to_string(),
        description: paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        data_source: None,
        is_available_upstream: !stable,
    };

    let paths = Arc::new(paths);
    ProtocolVersion::lazy(metadata, move || {
        let paths = Arc::clone(&paths);
        async move {
            let mut schemas = Vec::with_capacity(paths.len());
            for path in paths.iter() {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| FetchError::new(format!("schema {}", path.display()), e))?;
                schemas.push(ProtocolSchema::from_json(&json)?);
            }

            let mut schemas = schemas.into_iter();
            let first = schemas
                .next()
                .ok_or_else(|| Error::Schema("no schema files given".to_string()))?;
            let merged = merge_protocols(first, schemas);
            Ok::<_, Error>(if stable {
                stable_protocol(&merged)
            } else {
                merged
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use protoscope_core::MemoStatus;

    const BROWSER: &str = r#"{ "version": { "major": "1", "minor": "3" }, "domains": [
        { "domain": "Page", "commands": [ { "name": "reload" }, { "name": "crash", "experimental": true } ] }
    ] }"#;
    const JS: &str = r#"{ "domains": [
        { "domain": "Debugger", "commands": [ { "name": "enable" } ] }
    ] }"#;

    #[tokio::test]
    async fn test_merges_files_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let browser = temp.path().join("browser_protocol.json");
        let js = temp.path().join("js_protocol.json");
        std::fs::write(&browser, BROWSER).unwrap();
        std::fs::write(&js, JS).unwrap();

        let version = local_version(vec![browser.clone(), js.clone()], false);
        assert_eq!(version.status(), MemoStatus::Unfetched);
        let model = version.model().await.unwrap();
        let domains: Vec<&str> = model.schema().domains.iter().map(|d| d.domain.as_str()).collect();
        assert_eq!(domains, vec!["Debugger", "Page"]);
        assert_eq!(model.schema().version.as_ref().unwrap().minor, "3");

        let stable = local_version(vec![browser, js], true);
        let model = stable.model().await.unwrap();
        assert_eq!(model.schema().domains[1].commands().len(), 1);
        assert_eq!(stable.metadata().slug, "stable");
    }

    #[tokio::test]
    async fn test_missing_file_can_be_retried() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("late.json");
        let version = local_version(vec![path.clone()], false);
        assert!(version.model().await.is_err());

        std::fs::write(&path, JS).unwrap();
        assert_eq!(version.model().await.unwrap().schema().domains.len(), 1);
    }
}
