use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub type Edge = (String, String);

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("all elements of {0} must be pairs of two strings")]
    MalformedEdge(&'static str),
}

/// Required and forbidden edges known before discovery runs.
///
/// Used as soft constraints: discovery output is scored against them but never
/// rewritten to satisfy them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Knowledge {
    required_edges: Vec<Edge>,
    forbidden_edges: Vec<Edge>,
}

impl Knowledge {
    pub fn new(required_edges: Vec<Edge>, forbidden_edges: Vec<Edge>) -> Self {
        Self {
            required_edges,
            forbidden_edges,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn required_edges(&self) -> &[Edge] {
        &self.required_edges
    }

    pub fn forbidden_edges(&self) -> &[Edge] {
        &self.forbidden_edges
    }

    pub fn is_forbidden(&self, source: &str, target: &str) -> bool {
        self.forbidden_edges
            .iter()
            .any(|(u, v)| u == source && v == target)
    }

    /// Builds knowledge from loosely typed JSON, rejecting anything that is not a
    /// list of two-string pairs.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, KnowledgeError> {
        let required = parse_edges(value.get("required_edges"), "required_edges")?;
        let forbidden = parse_edges(value.get("forbidden_edges"), "forbidden_edges")?;
        Ok(Self::new(required, forbidden))
    }
}

fn parse_edges(
    value: Option<&serde_json::Value>,
    attribute: &'static str,
) -> Result<Vec<Edge>, KnowledgeError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or(KnowledgeError::MalformedEdge(attribute))?;

    items
        .iter()
        .map(|item| match item.as_array().map(|pair| pair.as_slice()) {
            Some([serde_json::Value::String(u), serde_json::Value::String(v)]) => {
                Ok((u.clone(), v.clone()))
            }
            _ => Err(KnowledgeError::MalformedEdge(attribute)),
        })
        .collect()
}

impl<'de> Deserialize<'de> for Knowledge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Knowledge::from_json_value(&value).map_err(serde::de::Error::custom)
    }
}
