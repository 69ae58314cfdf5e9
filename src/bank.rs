//! Question bank loading and validation
//!
//! The bank file is YAML: an ordered list of categories, each with an
//! optional name (one segment or a list of segments) and an ordered list of
//! questions. Question names must be unique within a category; duplicates are
//! rejected before any question is formatted.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::WrapError;
use crate::question::Question;

/// The whole question bank
#[derive(Debug, Clone, Deserialize)]
pub struct Bank {
    pub categories: Vec<Category>,
    /// Directory the image references inside the questions are relative to,
    /// mirrored on the remote host
    #[serde(rename = "pictures base directory")]
    pub pictures_base_directory: String,
}

/// A named grouping of questions sharing an import destination path
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub name: Option<CategoryName>,
    pub questions: Vec<Question>,
}

/// A category name: a single segment or an ordered list of path segments,
/// each emitting its own header line
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoryName {
    Single(String),
    Segments(Vec<String>),
}

impl CategoryName {
    pub fn segments(&self) -> &[String] {
        match self {
            CategoryName::Single(name) => std::slice::from_ref(name),
            CategoryName::Segments(names) => names,
        }
    }
}

impl Bank {
    /// Reads and parses a bank file
    pub fn load(path: &Path) -> Result<Bank, WrapError> {
        if !path.exists() {
            return Err(WrapError::MissingFile(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&source)?)
    }

    /// All the names within a category should be different
    pub fn validate(&self) -> Result<(), WrapError> {
        for category in &self.categories {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for question in &category.questions {
                *counts.entry(question.name.as_str()).or_insert(0) += 1;
            }
            let mut duplicates: Vec<&str> = counts
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .map(|(name, _)| name)
                .collect();
            if !duplicates.is_empty() {
                duplicates.sort_unstable();
                let category_name = category
                    .name
                    .as_ref()
                    .map(|n| n.segments().join("/"))
                    .unwrap_or_else(|| "(unnamed)".to_string());
                return Err(WrapError::Validation(format!(
                    "duplicates in category {}: {}",
                    category_name,
                    duplicates.join(", ")
                )));
            }
        }
        Ok(())
    }
}
