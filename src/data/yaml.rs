//! Small helpers over `yaml_rust::Yaml`.

use std::fs;
use std::path::Path;

use yaml_rust::{Yaml, YamlLoader};

use crate::error::AppError;

/// Load the first document of a YAML file (an empty file yields `Yaml::Null`).
pub(crate) fn load_file(path: &Path) -> Result<Yaml, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read YAML '{}': {e}", path.display())))?;
    load_str(&text).map_err(|e| AppError::input(format!("{} (in '{}')", e.message(), path.display())))
}

pub(crate) fn load_str(text: &str) -> Result<Yaml, AppError> {
    let mut docs = YamlLoader::load_from_str(text).map_err(|e| AppError::input(format!("Invalid YAML: {e}")))?;
    // Only the first document matters to us.
    if docs.is_empty() {
        Ok(Yaml::Null)
    } else {
        Ok(docs.swap_remove(0))
    }
}

/// Numeric scalar (YAML distinguishes integers from reals).
pub(crate) fn as_number(value: &Yaml) -> Option<f64> {
    match value {
        Yaml::Real(_) => value.as_f64(),
        Yaml::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

/// Optional numeric field of a mapping.
pub(crate) fn opt_number(node: &Yaml, key: &str, context: &str) -> Result<Option<f64>, AppError> {
    match &node[key] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        v => as_number(v)
            .map(Some)
            .ok_or_else(|| AppError::input(format!("Key '{key}' in {context} must be a number."))),
    }
}

/// Optional non-negative integer field of a mapping.
pub(crate) fn opt_count(node: &Yaml, key: &str, context: &str) -> Result<Option<usize>, AppError> {
    match &node[key] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(i) if *i >= 0 => Ok(Some(*i as usize)),
        _ => Err(AppError::input(format!(
            "Key '{key}' in {context} must be a non-negative integer."
        ))),
    }
}

/// Required list of numbers.
pub(crate) fn number_list(node: &Yaml, key: &str, context: &str) -> Result<Vec<f64>, AppError> {
    let items = match &node[key] {
        Yaml::BadValue => return Err(AppError::input(format!("Missing key '{key}' in {context}."))),
        Yaml::Array(items) => items,
        _ => return Err(AppError::input(format!("Key '{key}' in {context} must be a list."))),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            as_number(v).ok_or_else(|| AppError::input(format!("{context}.{key}[{i}] must be a number.")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_integers_and_reals() {
        let doc = load_str("a: 1\nb: 2.5\nc: x\nd: [1, 2.0]\n").unwrap();
        assert_eq!(opt_number(&doc, "a", "t").unwrap(), Some(1.0));
        assert_eq!(opt_number(&doc, "b", "t").unwrap(), Some(2.5));
        assert!(opt_number(&doc, "c", "t").unwrap_err().to_string().contains("must be a number"));
        assert_eq!(opt_number(&doc, "zzz", "t").unwrap(), None);
        assert!(number_list(&doc, "zzz", "t").unwrap_err().to_string().contains("Missing key"));
        assert_eq!(number_list(&doc, "d", "t").unwrap(), vec![1.0, 2.0]);
        assert_eq!(opt_count(&doc, "a", "t").unwrap(), Some(1));
        assert!(opt_count(&doc, "b", "t").is_err());
    }

    #[test]
    fn empty_document_is_null() {
        assert_eq!(load_str("").unwrap(), Yaml::Null);
    }
}
