//! Function metadata

use serde::{Deserialize, Serialize};

/// Memoization scope declared in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// Per agent id, survives resumes
    Agent,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Position in the method signature
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub description: String,
}

/// One callable operation as described by the offline metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub class: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheScope>,
}

impl FunctionSchema {
    /// `Class.method`, as recorded in history
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.name)
    }

    /// `Class_method`, as exposed inside the sandbox
    pub fn sandbox_name(&self) -> String {
        format!("{}_{}", self.class, self.name)
    }

    /// Parameters in declaration order
    pub fn ordered_parameters(&self) -> Vec<&ParameterSchema> {
        let mut params: Vec<&ParameterSchema> = self.parameters.iter().collect();
        params.sort_by_key(|p| p.index);
        params
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.ordered_parameters()
            .into_iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Signature line for prompts, e.g. `FileSystem_readFile(path: string) -> string`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .ordered_parameters()
            .into_iter()
            .map(|p| {
                let marker = if p.optional { "?" } else { "" };
                format!("{}{}: {}", p.name, marker, p.ty)
            })
            .collect();
        let mut line = format!("{}({})", self.sandbox_name(), params.join(", "));
        if let Some(returns) = &self.returns {
            line.push_str(" -> ");
            line.push_str(returns);
        }
        line
    }
}

/// Parse a class's metadata document
pub fn parse_metadata(json: &str) -> serde_json::Result<Vec<FunctionSchema>> {
    serde_json::from_str(json)
}
