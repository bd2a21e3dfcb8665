//! Field extraction
//!
//! Read conversions can capture selected fields of each decoded message so the
//! caller can route or index on them without parsing the output again. Paths use
//! the `$.field.nested` form and address record or message fields by name.

use std::collections::HashMap;

use crate::velostream::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    path: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProperty {
            key: "model.extract".to_string(),
            value: path.to_string(),
            reason: reason.to_string(),
        };

        let fields = path
            .strip_prefix("$.")
            .ok_or_else(|| invalid("paths must start with '$.'"))?;
        let segments: Vec<String> = fields.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid("empty field name"));
        }

        Ok(Self {
            path: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Values captured from the most recently decoded message
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    paths: Vec<FieldPath>,
    values: HashMap<String, String>,
}

impl ExtractedFields {
    pub fn new(paths: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            paths: paths
                .iter()
                .map(|p| FieldPath::parse(p))
                .collect::<Result<_, _>>()?,
            values: HashMap::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.values.get(path).map(String::as_str)
    }

    /// Fill every configured path using `lookup`; paths it cannot resolve stay empty
    pub fn capture<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&[String]) -> Option<String>,
    {
        self.values.clear();
        for path in &self.paths {
            if let Some(value) = lookup(path.segments()) {
                self.values.insert(path.as_str().to_string(), value);
            }
        }
    }

    /// Fresh, empty copy for another stream
    pub fn for_stream(&self) -> Self {
        Self {
            paths: self.paths.clone(),
            values: HashMap::new(),
        }
    }
}
