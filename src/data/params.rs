//! Parameter files (flat `name: value` mappings), e.g. `mle_params.yml`.

use std::fs;
use std::path::Path;

use yaml_rust::yaml::Hash;
use yaml_rust::{Yaml, YamlEmitter};

use crate::data::yaml::{as_number, load_file};
use crate::domain::ParamSet;
use crate::error::AppError;

pub const MLE_PARAMS_FILE: &str = "mle_params.yml";

pub fn load_params(path: &Path) -> Result<ParamSet, AppError> {
    let doc = load_file(path)?;
    parse_params(&doc).map_err(|e| AppError::input(format!("{} (in '{}')", e.message(), path.display())))
}

pub(crate) fn parse_params(doc: &Yaml) -> Result<ParamSet, AppError> {
    let hash = match doc {
        Yaml::Hash(hash) => hash,
        Yaml::Null => return Ok(ParamSet::new()),
        _ => return Err(AppError::input("Parameter file must be a mapping of name: value.")),
    };

    let mut params = ParamSet::new();
    for (key, value) in hash {
        let name = key
            .as_str()
            .ok_or_else(|| AppError::input("Parameter names must be strings."))?;
        let value = as_number(value)
            .ok_or_else(|| AppError::input(format!("Parameter '{name}' must be a number.")))?;
        params.insert(name.to_string(), value);
    }
    Ok(params)
}

pub fn params_to_yaml(params: &ParamSet) -> Result<String, AppError> {
    let mut hash = Hash::new();
    for (name, value) in params {
        // Debug formatting always keeps a decimal point/exponent, so values reload as reals.
        hash.insert(Yaml::String(name.clone()), Yaml::Real(format!("{value:?}")));
    }
    let mut out = String::new();
    YamlEmitter::new(&mut out)
        .dump(&Yaml::Hash(hash))
        .map_err(|e| AppError::input(format!("Failed to serialize parameters: {e:?}")))?;
    out.push('\n');
    Ok(out)
}

pub fn write_params(path: &Path, params: &ParamSet) -> Result<(), AppError> {
    let text = params_to_yaml(params)?;
    fs::write(path, text)
        .map_err(|e| AppError::input(format!("Failed to write parameters '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::yaml::load_str;

    #[test]
    fn parse_accepts_numbers_and_rejects_other_values() {
        let params = parse_params(&load_str("a: 1\nb: 0.25\n").unwrap()).unwrap();
        assert_eq!(params["a"], 1.0);
        assert_eq!(params["b"], 0.25);

        assert!(parse_params(&load_str("a: text\n").unwrap()).is_err());
        assert!(parse_params(&load_str("[1, 2]").unwrap()).is_err());
        assert!(parse_params(&load_str("").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn written_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MLE_PARAMS_FILE);
        let mut params = ParamSet::new();
        params.insert("transmission_rate".to_string(), 4.5);
        params.insert("tb_death_rate".to_string(), 1e-7);
        params.insert("activation_rate_early".to_string(), 1.0);

        write_params(&path, &params).unwrap();
        assert_eq!(load_params(&path).unwrap(), params);
    }
}
