//! Protocol schema documents
//!
//! Mirrors the JSON layout of protocol definition files: a list of domains,
//! each declaring commands, events and types. Types are a tagged union keyed
//! by `"type"`, except references which carry only a `"$ref"`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Kind of a top-level domain member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Command,
    Event,
    Type,
}

impl MemberKind {
    pub const ALL: [MemberKind; 3] = [MemberKind::Command, MemberKind::Event, MemberKind::Type];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Command => "command",
            MemberKind::Event => "event",
            MemberKind::Type => "type",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: String,
    pub minor: String,
}

/// A whole protocol: an ordered list of domains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    pub domains: Vec<Domain>,
}

impl ProtocolSchema {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Name of the domain
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub experimental: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<TypeDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Command>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            domain: name.into(),
            description: None,
            experimental: false,
            deprecated: false,
            dependencies: None,
            types: None,
            commands: None,
            events: None,
        }
    }

    pub fn commands(&self) -> &[Command] {
        self.commands.as_deref().unwrap_or(&[])
    }

    pub fn events(&self) -> &[Event] {
        self.events.as_deref().unwrap_or(&[])
    }

    pub fn types(&self) -> &[TypeDef] {
        self.types.as_deref().unwrap_or(&[])
    }

    /// Local names of every member of one kind, in declaration order
    pub fn member_names(&self, kind: MemberKind) -> Vec<&str> {
        match kind {
            MemberKind::Command => self.commands().iter().map(|c| c.name.as_str()).collect(),
            MemberKind::Event => self.events().iter().map(|e| e.name.as_str()).collect(),
            MemberKind::Type => self.types().iter().map(|t| t.id.as_str()).collect(),
        }
    }

    /// Whether the domain declares no commands, events or types
    pub fn is_empty(&self) -> bool {
        self.commands().is_empty() && self.events().is_empty() && self.types().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub experimental: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<PropertyType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Vec<PropertyType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(rename = "async", default, skip_serializing_if = "is_false")]
    pub is_async: bool,
}

impl Command {
    pub fn parameters(&self) -> &[PropertyType] {
        self.parameters.as_deref().unwrap_or(&[])
    }

    pub fn returns(&self) -> &[PropertyType] {
        self.returns.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub experimental: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<PropertyType>>,
}

impl Event {
    pub fn parameters(&self) -> &[PropertyType] {
        self.parameters.as_deref().unwrap_or(&[])
    }
}

/// A named type declared by a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub experimental: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(flatten)]
    pub ty: ProtocolType,
}

/// A parameter, return value or object property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyType {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub experimental: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(flatten)]
    pub ty: ProtocolType,
}

/// The shape of a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtocolType {
    /// Pointer to a named type, `Name` or `Domain.Name`
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Known(KnownType),
    /// A `"type"` tag this crate does not understand
    Unknown {
        #[serde(rename = "type")]
        type_name: String,
    },
}

impl ProtocolType {
    pub fn reference(name: impl Into<String>) -> Self {
        ProtocolType::Ref {
            reference: name.into(),
        }
    }

    pub fn array(items: ProtocolType) -> Self {
        ProtocolType::Known(KnownType::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        })
    }

    pub fn object(properties: Vec<PropertyType>) -> Self {
        ProtocolType::Known(KnownType::Object {
            properties: Some(properties),
        })
    }

    pub fn string() -> Self {
        ProtocolType::Known(KnownType::String { values: None })
    }

    pub fn integer() -> Self {
        ProtocolType::Known(KnownType::Integer)
    }

    pub fn number() -> Self {
        ProtocolType::Known(KnownType::Number)
    }

    pub fn boolean() -> Self {
        ProtocolType::Known(KnownType::Boolean)
    }

    pub fn any() -> Self {
        ProtocolType::Known(KnownType::Any)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KnownType {
    Array {
        items: Box<ProtocolType>,
        #[serde(rename = "minItems", default, skip_serializing_if = "Option::is_none")]
        min_items: Option<u64>,
        #[serde(rename = "maxItems", default, skip_serializing_if = "Option::is_none")]
        max_items: Option<u64>,
    },
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<Vec<PropertyType>>,
    },
    String {
        #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<String>>,
    },
    Integer,
    Number,
    Boolean,
    Any,
}

impl PropertyType {
    pub fn new(name: impl Into<String>, ty: ProtocolType) -> Self {
        Self {
            name: name.into(),
            optional: false,
            description: None,
            experimental: false,
            deprecated: false,
            ty,
        }
    }
}

impl TypeDef {
    pub fn new(id: impl Into<String>, ty: ProtocolType) -> Self {
        Self {
            id: id.into(),
            description: None,
            experimental: false,
            deprecated: false,
            ty,
        }
    }
}

/// A `Domain.localName` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub domain: String,
    pub local: String,
}

impl QualifiedName {
    pub fn new(domain: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            local: local.into(),
        }
    }

    /// Parse a name that must be qualified, splitting on the first `.`
    pub fn parse(qualified: &str) -> Result<Self> {
        match qualified.split_once('.') {
            Some((domain, local)) => Ok(Self::new(domain, local)),
            None => Err(Error::InvalidRef(qualified.to_string())),
        }
    }

    /// Resolve a `$ref` against the domain it appears in.
    ///
    /// A dotted ref names its domain explicitly; a bare ref is local to
    /// `current_domain`.
    pub fn resolve(reference: &str, current_domain: &str) -> Self {
        match reference.split_once('.') {
            Some((domain, local)) => Self::new(domain, local),
            None => Self::new(current_domain, reference),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": { "major": "1", "minor": "3" },
        "domains": [
            {
                "domain": "Network",
                "experimental": true,
                "dependencies": ["Runtime"],
                "types": [
                    { "id": "RequestId", "type": "string" },
                    { "id": "Cookie", "type": "object", "properties": [
                        { "name": "expires", "$ref": "Runtime.Timestamp" },
                        { "name": "sameSite", "type": "string", "enum": ["Strict", "Lax"], "optional": true },
                        { "name": "ports", "type": "array", "items": { "type": "integer" } }
                    ]}
                ],
                "commands": [
                    { "name": "getCookies", "returns": [
                        { "name": "cookies", "type": "array", "items": { "$ref": "Cookie" } }
                    ]},
                    { "name": "enable", "async": true }
                ],
                "events": [
                    { "name": "requestWillBeSent", "deprecated": true, "parameters": [
                        { "name": "requestId", "$ref": "RequestId" }
                    ]}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let schema = ProtocolSchema::from_json(SAMPLE).unwrap();
        assert_eq!(schema.version.as_ref().unwrap().minor, "3");
        let network = &schema.domains[0];
        assert!(network.experimental);
        assert_eq!(network.types().len(), 2);
        assert_eq!(network.commands()[1].name, "enable");
        assert!(network.commands()[1].is_async);
        assert!(network.events()[0].deprecated);

        let cookie = &network.types()[1];
        let ProtocolType::Known(KnownType::Object { properties: Some(props) }) = &cookie.ty else {
            panic!("Cookie should be an object: {:?}", cookie.ty);
        };
        assert_eq!(props[0].ty, ProtocolType::reference("Runtime.Timestamp"));
        assert!(props[1].optional);
        assert_eq!(
            props[1].ty,
            ProtocolType::Known(KnownType::String {
                values: Some(vec!["Strict".into(), "Lax".into()])
            })
        );
        assert_eq!(props[2].ty, ProtocolType::array(ProtocolType::integer()));
    }

    #[test]
    fn test_serialize_preserves_shape() {
        let schema = ProtocolSchema::from_json(SAMPLE).unwrap();
        let json: serde_json::Value = serde_json::from_str(&schema.to_json().unwrap()).unwrap();
        let cookie = &json["domains"][0]["types"][1];
        assert_eq!(cookie["type"], "object");
        assert_eq!(cookie["properties"][0]["$ref"], "Runtime.Timestamp");
        assert_eq!(cookie["properties"][1]["enum"][1], "Lax");
        assert!(cookie["properties"][0].get("optional").is_none());
        assert_eq!(json["domains"][0]["commands"][1]["async"], true);
    }

    #[test]
    fn test_unknown_type_tag_is_kept() {
        let json = r#"{ "domains": [ { "domain": "X", "types": [ { "id": "T", "type": "tuple" } ] } ] }"#;
        let schema = ProtocolSchema::from_json(json).unwrap();
        assert_eq!(
            schema.domains[0].types()[0].ty,
            ProtocolType::Unknown {
                type_name: "tuple".into()
            }
        );
    }

    #[test]
    fn test_qualified_names() {
        assert_eq!(
            QualifiedName::parse("Network.getCookies").unwrap(),
            QualifiedName::new("Network", "getCookies")
        );
        assert!(matches!(
            QualifiedName::parse("getCookies"),
            Err(Error::InvalidRef(_))
        ));
        assert_eq!(
            QualifiedName::resolve("Cookie", "Network").to_string(),
            "Network.Cookie"
        );
        assert_eq!(
            QualifiedName::resolve("Runtime.Timestamp", "Network").to_string(),
            "Runtime.Timestamp"
        );
        // split happens on the first dot only
        assert_eq!(QualifiedName::resolve("A.b.c", "X").local, "b.c");
    }
}
