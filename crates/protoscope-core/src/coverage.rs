//! Implementation coverage statistics

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::references::ReferenceMap;
use crate::schema::{MemberKind, ProtocolSchema};

/// Number of domains and members of each kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCounts {
    pub domains: usize,
    pub commands: usize,
    pub events: usize,
    pub types: usize,
}

impl MemberCounts {
    /// Commands, events and types together
    pub fn members(&self) -> usize {
        self.commands + self.events + self.types
    }

    fn of_kind_mut(&mut self, kind: MemberKind) -> &mut usize {
        match kind {
            MemberKind::Command => &mut self.commands,
            MemberKind::Event => &mut self.events,
            MemberKind::Type => &mut self.types,
        }
    }
}

/// How much of a protocol one implementation references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationStats {
    /// Display name of the implementation
    pub implementation: String,

    /// Sizes of the protocol; domains without members are not counted
    pub protocol: MemberCounts,

    /// Members with at least one reference, and the domains they belong to
    pub implemented: MemberCounts,
}

impl ImplementationStats {
    pub fn compute(
        implementation: impl Into<String>,
        schema: &ProtocolSchema,
        references: &ReferenceMap,
    ) -> Self {
        let mut protocol = MemberCounts::default();
        for domain in &schema.domains {
            protocol.commands += domain.commands().len();
            protocol.events += domain.events().len();
            protocol.types += domain.types().len();
            if !domain.is_empty() {
                protocol.domains += 1;
            }
        }

        let mut implemented = MemberCounts::default();
        let mut domains = BTreeSet::new();
        for kind in MemberKind::ALL {
            for name in references.referenced(kind) {
                *implemented.of_kind_mut(kind) += 1;
                domains.insert(name.split_once('.').map_or(name, |(domain, _)| domain));
            }
        }
        implemented.domains = domains.len();

        ImplementationStats {
            implementation: implementation.into(),
            protocol,
            implemented,
        }
    }

    /// Coverage percentage (0.0 - 100.0)
    pub fn coverage_percent(&self) -> f64 {
        let total = self.protocol.members();
        if total == 0 {
            return 100.0;
        }
        (self.implemented.members() as f64 / total as f64) * 100.0
    }

    /// Whether coverage reaches `threshold` percent
    pub fn is_passing(&self, threshold: f64) -> bool {
        self.coverage_percent() >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::{Reference, ReferenceLocation};

    fn hit() -> Vec<Reference> {
        vec![Reference::Location(ReferenceLocation {
            source: None,
            line: 1,
            column: 1,
        })]
    }

    #[test]
    fn test_compute() {
        let schema = ProtocolSchema::from_json(
            r#"{ "domains": [
                { "domain": "Page", "commands": [ { "name": "reload" }, { "name": "enable" } ],
                  "events": [ { "name": "loadEventFired" } ] },
                { "domain": "Runtime", "types": [ { "id": "RemoteObject", "type": "object" } ] },
                { "domain": "Empty" }
            ] }"#,
        )
        .unwrap();
        let mut refs = ReferenceMap::new();
        refs.commands.insert("Page.reload".into(), hit());
        refs.commands.insert("Page.enable".into(), vec![]);
        refs.types.insert("Runtime.RemoteObject".into(), hit());

        let stats = ImplementationStats::compute("Hermes", &schema, &refs);
        assert_eq!(
            stats.protocol,
            MemberCounts {
                domains: 2,
                commands: 2,
                events: 1,
                types: 1
            }
        );
        assert_eq!(
            stats.implemented,
            MemberCounts {
                domains: 2,
                commands: 1,
                events: 0,
                types: 1
            }
        );
        assert_eq!(stats.coverage_percent(), 50.0);
        assert!(stats.is_passing(50.0));
        assert!(!stats.is_passing(50.1));
    }

    #[test]
    fn test_empty_schema_is_fully_covered() {
        let stats = ImplementationStats::compute("x", &ProtocolSchema::default(), &ReferenceMap::new());
        assert_eq!(stats.coverage_percent(), 100.0);
    }
}
