//! Wire-format request/response payloads and their normalization into the
//! typed internal representation the resolver operates on.
//!
//! The wire format is loosely typed JSON: tags may be plain strings or
//! nested arrays, ports may arrive as integers or floats, and a dependency
//! position may be a single spec object or a list of alternatives. All of
//! that polymorphism is absorbed here, at the edge — nothing downstream of
//! [`ToolMetadata::normalize`] ever sees raw JSON again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_namespace() -> String {
    "default".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// `POST /agents/register` and `POST /heartbeat` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub agent_id: String,
    /// Accepted for shape compatibility, ignored — the registry uses its
    /// own wall clock exclusively.
    #[serde(default)]
    pub timestamp: Option<Value>,
    pub metadata: AgentMetadata,
}

/// Loosely-typed agent metadata as it arrives over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentMetadata {
    pub agent_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub http_host: Option<String>,
    /// Port may arrive as an integer or a float; normalized to `u16`.
    #[serde(default)]
    pub http_port: Option<Value>,
    #[serde(default)]
    pub tools: Vec<ToolMetadata>,
}

impl AgentMetadata {
    pub fn resolved_name(&self, agent_id: &str) -> String {
        self.name.clone().unwrap_or_else(|| agent_id.to_string())
    }

    pub fn resolved_port(&self) -> Option<u16> {
        match &self.http_port {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|v| v as u16)
                .or_else(|| n.as_f64().map(|v| v as u16)),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

/// One tool entry inside `tools[]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolMetadata {
    pub function_name: String,
    pub capability: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<TagAtomWire>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub dependencies: Vec<DependencyPositionWire>,
    #[serde(default)]
    pub llm_filter: Option<LlmFilterWire>,
    #[serde(default)]
    pub llm_provider: Option<DependencySpecWire>,
    #[serde(default)]
    pub kwargs: Option<Value>,
}

impl ToolMetadata {
    /// Normalize tags (heterogeneous string list) into a flat `Vec<String>`,
    /// dropping non-string entries per the edge-normalization rule.
    pub fn normalized_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|atom| match atom {
                TagAtomWire::Plain(s) => Some(s.clone()),
                TagAtomWire::Nested(_) => None,
            })
            .collect()
    }

    pub fn dependency_positions(&self) -> Vec<DependencyPosition> {
        self.dependencies
            .iter()
            .map(DependencyPositionWire::normalize)
            .collect()
    }
}

/// A tag atom: a plain string (possibly prefixed `+`/`-`) or a nested list
/// of strings expressing a tag-level OR at that slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagAtomWire {
    Plain(String),
    Nested(Vec<String>),
}

/// A single capability/version/tags/namespace match predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpecWire {
    pub capability: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagAtomWire>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// One position in a function's `dependencies` list: a single spec, or an
/// ordered list of alternatives (first-matching-wins).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencyPositionWire {
    Single(DependencySpecWire),
    Alternatives(Vec<DependencySpecWire>),
}

impl DependencyPositionWire {
    pub fn normalize(&self) -> DependencyPosition {
        match self {
            DependencyPositionWire::Single(spec) => {
                DependencyPosition::Single(DependencySpec::from_wire(spec))
            }
            DependencyPositionWire::Alternatives(specs) => DependencyPosition::Alternatives(
                specs.iter().map(DependencySpec::from_wire).collect(),
            ),
        }
    }
}

/// `{filter: [spec, ...], filter_mode}` — each spec is either a plain
/// capability name or `{capability, tags}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFilterWire {
    #[serde(default)]
    pub filter: Vec<LlmFilterEntryWire>,
    #[serde(default)]
    pub filter_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmFilterEntryWire {
    CapabilityName(String),
    Spec {
        capability: String,
        #[serde(default)]
        tags: Vec<TagAtomWire>,
    },
}

impl LlmFilterEntryWire {
    pub fn normalize(&self) -> DependencySpec {
        match self {
            LlmFilterEntryWire::CapabilityName(capability) => DependencySpec {
                capability: capability.clone(),
                version: None,
                tag_slots: Vec::new(),
                namespace: None,
            },
            LlmFilterEntryWire::Spec { capability, tags } => DependencySpec {
                capability: capability.clone(),
                version: None,
                tag_slots: tag_slots_from_wire(tags),
                namespace: None,
            },
        }
    }
}

/// A single `(prefix, name)` tag atom in normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagAtom {
    Required(String),
    Preferred(String),
    Excluded(String),
}

impl TagAtom {
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix('+') {
            TagAtom::Preferred(name.to_string())
        } else if let Some(name) = raw.strip_prefix('-') {
            TagAtom::Excluded(name.to_string())
        } else {
            TagAtom::Required(raw.to_string())
        }
    }

    /// Reconstruct the wire-form atom (`name`, `+name`, or `-name`), for
    /// persisting the required-tags diagnostic columns on a resolution row.
    pub fn to_raw(&self) -> String {
        match self {
            TagAtom::Required(name) => name.clone(),
            TagAtom::Preferred(name) => format!("+{name}"),
            TagAtom::Excluded(name) => format!("-{name}"),
        }
    }

    /// `None` = this atom rejects the candidate. `Some(score)` = passes,
    /// contributing `score` to the candidate's total.
    pub fn evaluate(&self, candidate_tags: &[String]) -> Option<i32> {
        match self {
            TagAtom::Required(name) => {
                if candidate_tags.iter().any(|t| t == name) {
                    Some(5)
                } else {
                    None
                }
            }
            TagAtom::Preferred(name) => {
                if candidate_tags.iter().any(|t| t == name) {
                    Some(10)
                } else {
                    Some(0)
                }
            }
            TagAtom::Excluded(name) => {
                if candidate_tags.iter().any(|t| t == name) {
                    None
                } else {
                    Some(0)
                }
            }
        }
    }
}

/// One AND-slot of the tag predicate: usually a single atom, or — when the
/// wire payload nested a list at this position — an OR of alternative
/// atoms. The slot passes if any alternative passes; its score is the best
/// passing alternative's score.
#[derive(Debug, Clone)]
pub struct TagSlot(pub Vec<TagAtom>);

impl TagSlot {
    pub fn evaluate(&self, candidate_tags: &[String]) -> Option<i32> {
        let mut best: Option<i32> = None;
        for atom in &self.0 {
            if let Some(score) = atom.evaluate(candidate_tags) {
                best = Some(best.map_or(score, |b| b.max(score)));
            }
        }
        best
    }
}

fn tag_slots_from_wire(tags: &[TagAtomWire]) -> Vec<TagSlot> {
    tags.iter()
        .map(|atom| match atom {
            TagAtomWire::Plain(s) => TagSlot(vec![TagAtom::parse(s)]),
            TagAtomWire::Nested(list) => {
                TagSlot(list.iter().map(|s| TagAtom::parse(s)).collect())
            }
        })
        .collect()
}

/// Normalized match predicate: `(capability, version?, tag slots, namespace?)`.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    pub capability: String,
    pub version: Option<String>,
    pub tag_slots: Vec<TagSlot>,
    pub namespace: Option<String>,
}

impl DependencySpec {
    pub fn from_wire(wire: &DependencySpecWire) -> Self {
        Self {
            capability: wire.capability.clone(),
            version: wire.version.clone(),
            tag_slots: tag_slots_from_wire(&wire.tags),
            namespace: wire.namespace.clone(),
        }
    }

    /// Flatten the tag slots back to their wire-form strings, for the
    /// `required_tags` diagnostic column on a persisted resolution row. Each
    /// slot contributes its first atom; a slot holding a tag-level OR is
    /// reduced to that OR's first alternative, which is a lossy but
    /// sufficient diagnostic (the full predicate lives in the original
    /// request, not the resolution row).
    pub fn raw_tags(&self) -> Vec<String> {
        self.tag_slots
            .iter()
            .filter_map(|slot| slot.0.first())
            .map(TagAtom::to_raw)
            .collect()
    }
}

/// A normalized dependency position: single spec, or ordered alternatives.
#[derive(Debug, Clone)]
pub enum DependencyPosition {
    Single(DependencySpec),
    Alternatives(Vec<DependencySpec>),
}

impl DependencyPosition {
    /// The spec alternatives should be tried in, in order.
    pub fn alternatives(&self) -> Vec<&DependencySpec> {
        match self {
            DependencyPosition::Single(spec) => vec![spec],
            DependencyPosition::Alternatives(specs) => specs.iter().collect(),
        }
    }
}

/// Tool registration echoed back / forwarded as part of heartbeat requests
/// originating from an agent runtime (mirrors the shape agents send).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistrationWire {
    pub function_name: String,
    pub capability: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `POST /heartbeat` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<AgentMetadata>,
}

/// One resolved provider, as returned to the client inline and persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProvider {
    pub agent_id: String,
    pub function_name: String,
    pub capability: String,
    pub endpoint: String,
    pub status: String,
}

/// Response shared by `register` and `heartbeat`.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResponse {
    pub status: String,
    pub agent_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dependencies_resolved: HashMap<String, Vec<ResolvedProvider>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub llm_tools: HashMap<String, Vec<ResolvedProvider>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub llm_providers: HashMap<String, Option<ResolvedProvider>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_atom_parses_prefixes() {
        assert_eq!(TagAtom::parse("gpt"), TagAtom::Required("gpt".into()));
        assert_eq!(TagAtom::parse("+opus"), TagAtom::Preferred("opus".into()));
        assert_eq!(
            TagAtom::parse("-premium"),
            TagAtom::Excluded("premium".into())
        );
    }

    #[test]
    fn required_tag_rejects_missing_candidate() {
        let atom = TagAtom::parse("gpt");
        assert_eq!(atom.evaluate(&["claude".to_string()]), None);
        assert_eq!(atom.evaluate(&["gpt".to_string()]), Some(5));
    }

    #[test]
    fn excluded_tag_rejects_when_present() {
        let atom = TagAtom::parse("-premium");
        assert_eq!(atom.evaluate(&["premium".to_string()]), None);
        assert_eq!(atom.evaluate(&["other".to_string()]), Some(0));
    }

    #[test]
    fn preferred_tag_never_rejects() {
        let atom = TagAtom::parse("+opus");
        assert_eq!(atom.evaluate(&["other".to_string()]), Some(0));
        assert_eq!(atom.evaluate(&["opus".to_string()]), Some(10));
    }

    #[test]
    fn normalized_tags_drop_nested_entries() {
        let tool = ToolMetadata {
            function_name: "f".into(),
            capability: "c".into(),
            version: "1.0.0".into(),
            tags: vec![
                TagAtomWire::Plain("a".into()),
                TagAtomWire::Nested(vec!["b".into(), "c".into()]),
            ],
            description: None,
            input_schema: None,
            dependencies: vec![],
            llm_filter: None,
            llm_provider: None,
            kwargs: None,
        };
        assert_eq!(tool.normalized_tags(), vec!["a".to_string()]);
    }
}
