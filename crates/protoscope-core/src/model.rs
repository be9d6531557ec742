//! Qualified-name lookups and transitive schema filtering

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, LookupKind, Result};
use crate::schema::{
    Command, Domain, Event, KnownType, MemberKind, ProtocolSchema, ProtocolType, QualifiedName,
    TypeDef,
};

/// A schema member a closure starts from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedRef {
    /// Qualified name, `Domain.member`
    #[serde(rename = "$ref")]
    pub name: String,
    pub kind: MemberKind,
}

impl SeedRef {
    pub fn new(kind: MemberKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::new(MemberKind::Command, name)
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self::new(MemberKind::Event, name)
    }

    pub fn ty(name: impl Into<String>) -> Self {
        Self::new(MemberKind::Type, name)
    }
}

/// A schema with eagerly built lookup indices.
///
/// Indices store positions into the owned schema, which is never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct ProtocolModel {
    schema: ProtocolSchema,
    domains: HashMap<String, usize>,
    commands: HashMap<String, (usize, usize)>,
    events: HashMap<String, (usize, usize)>,
    types: HashMap<String, (usize, usize)>,
}

impl ProtocolModel {
    /// Index a schema. Fails if a qualified name is declared twice.
    pub fn new(schema: ProtocolSchema) -> Result<Self> {
        let mut domains = HashMap::new();
        let mut commands = HashMap::new();
        let mut events = HashMap::new();
        let mut types = HashMap::new();

        for (d, domain) in schema.domains.iter().enumerate() {
            if domains.insert(domain.domain.clone(), d).is_some() {
                return Err(Error::Schema(format!("duplicate domain {}", domain.domain)));
            }
            for kind in MemberKind::ALL {
                let index = match kind {
                    MemberKind::Command => &mut commands,
                    MemberKind::Event => &mut events,
                    MemberKind::Type => &mut types,
                };
                for (m, local) in domain.member_names(kind).into_iter().enumerate() {
                    let key = format!("{}.{}", domain.domain, local);
                    if index.insert(key.clone(), (d, m)).is_some() {
                        return Err(Error::Schema(format!("duplicate {kind} {key}")));
                    }
                }
            }
        }

        Ok(Self {
            schema,
            domains,
            commands,
            events,
            types,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(ProtocolSchema::from_json(json)?)
    }

    pub fn schema(&self) -> &ProtocolSchema {
        &self.schema
    }

    pub fn into_schema(self) -> ProtocolSchema {
        self.schema
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name).map(|&d| &self.schema.domains[d])
    }

    pub fn domain_enforcing(&self, name: &str) -> Result<&Domain> {
        self.domain(name)
            .ok_or_else(|| Error::not_found(LookupKind::Domain, name))
    }

    pub fn command(&self, name: &QualifiedName) -> Option<&Command> {
        self.commands
            .get(&name.to_string())
            .map(|&(d, m)| &self.schema.domains[d].commands()[m])
    }

    pub fn command_enforcing(&self, name: &QualifiedName) -> Result<&Command> {
        self.command(name)
            .ok_or_else(|| Error::not_found(LookupKind::Command, name.to_string()))
    }

    pub fn event(&self, name: &QualifiedName) -> Option<&Event> {
        self.events
            .get(&name.to_string())
            .map(|&(d, m)| &self.schema.domains[d].events()[m])
    }

    pub fn event_enforcing(&self, name: &QualifiedName) -> Result<&Event> {
        self.event(name)
            .ok_or_else(|| Error::not_found(LookupKind::Event, name.to_string()))
    }

    pub fn type_def(&self, name: &QualifiedName) -> Option<&TypeDef> {
        self.types
            .get(&name.to_string())
            .map(|&(d, m)| &self.schema.domains[d].types()[m])
    }

    pub fn type_enforcing(&self, name: &QualifiedName) -> Result<&TypeDef> {
        self.type_def(name)
            .ok_or_else(|| Error::not_found(LookupKind::Type, name.to_string()))
    }

    /// Resolve a `$ref` as seen from `current_domain`
    pub fn resolve_ref(&self, reference: &str, current_domain: &str) -> QualifiedName {
        QualifiedName::resolve(reference, current_domain)
    }

    /// Derive the sub-schema reachable from `seeds`.
    ///
    /// Commands pull in their parameter and return types, events their
    /// parameter types, and types everything their definitions reference,
    /// transitively. Domains left without members are dropped.
    pub fn filter_protocol(&self, seeds: &[SeedRef]) -> Result<ProtocolSchema> {
        let mut closure = Closure::new(self);
        for seed in seeds {
            let name = QualifiedName::parse(&seed.name)?;
            match seed.kind {
                MemberKind::Command => closure.visit_command(&name)?,
                MemberKind::Event => closure.visit_event(&name)?,
                MemberKind::Type => {
                    closure.visit_type(&ProtocolType::reference(seed.name.as_str()), &name.domain)?
                }
            }
        }

        debug!(
            commands = closure.commands.len(),
            events = closure.events.len(),
            types = closure.types.len(),
            seeds = seeds.len(),
            "computed schema closure"
        );
        Ok(closure.into_schema())
    }
}

/// Visited sets of one closure computation
struct Closure<'a> {
    model: &'a ProtocolModel,
    commands: HashSet<String>,
    events: HashSet<String>,
    types: HashSet<String>,
}

impl<'a> Closure<'a> {
    fn new(model: &'a ProtocolModel) -> Self {
        Self {
            model,
            commands: HashSet::new(),
            events: HashSet::new(),
            types: HashSet::new(),
        }
    }

    fn visit_command(&mut self, name: &QualifiedName) -> Result<()> {
        if !self.commands.insert(name.to_string()) {
            return Ok(());
        }
        let command = self.model.command_enforcing(name)?;
        for property in command.parameters().iter().chain(command.returns()) {
            self.visit_type(&property.ty, &name.domain)?;
        }
        Ok(())
    }

    fn visit_event(&mut self, name: &QualifiedName) -> Result<()> {
        if !self.events.insert(name.to_string()) {
            return Ok(());
        }
        let event = self.model.event_enforcing(name)?;
        for property in event.parameters() {
            self.visit_type(&property.ty, &name.domain)?;
        }
        Ok(())
    }

    fn visit_type(&mut self, ty: &ProtocolType, origin_domain: &str) -> Result<()> {
        match ty {
            ProtocolType::Ref { reference } => {
                let resolved = self.model.resolve_ref(reference, origin_domain);
                if !self.types.insert(resolved.to_string()) {
                    return Ok(());
                }
                let def = self.model.type_enforcing(&resolved)?;
                self.visit_type(&def.ty, &resolved.domain)
            }
            ProtocolType::Known(KnownType::Array { items, .. }) => {
                self.visit_type(items, origin_domain)
            }
            ProtocolType::Known(KnownType::Object { properties }) => {
                for property in properties.iter().flatten() {
                    self.visit_type(&property.ty, origin_domain)?;
                }
                Ok(())
            }
            ProtocolType::Known(
                KnownType::String { .. }
                | KnownType::Integer
                | KnownType::Number
                | KnownType::Boolean
                | KnownType::Any,
            ) => Ok(()),
            ProtocolType::Unknown { type_name } => Err(Error::Schema(format!(
                "unhandled type {type_name:?} in domain {origin_domain}"
            ))),
        }
    }

    fn into_schema(self) -> ProtocolSchema {
        let source = self.model.schema();
        let domains = source
            .domains
            .iter()
            .map(|domain| {
                let key = |local: &str| format!("{}.{}", domain.domain, local);
                Domain {
                    commands: domain.commands.as_ref().map(|commands| {
                        commands
                            .iter()
                            .filter(|c| self.commands.contains(&key(&c.name)))
                            .cloned()
                            .collect()
                    }),
                    events: domain.events.as_ref().map(|events| {
                        events
                            .iter()
                            .filter(|e| self.events.contains(&key(&e.name)))
                            .cloned()
                            .collect()
                    }),
                    types: domain.types.as_ref().map(|types| {
                        types
                            .iter()
                            .filter(|t| self.types.contains(&key(&t.id)))
                            .cloned()
                            .collect()
                    }),
                    ..domain.clone()
                }
            })
            .filter(|domain| !domain.is_empty())
            .collect();

        ProtocolSchema {
            version: source.version.clone(),
            domains,
        }
    }
}
