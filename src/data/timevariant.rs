//! Time-variant input series (`time_variant_params.yml`).
//!
//! Expected layout:
//!
//! ```yaml
//! crude_birth_rate:        # births per 1000 per year
//!   times: [1850, 1950, ...]
//!   values: [38.0, 35.0, ...]
//! life_expectancy:         # years
//!   times: [...]
//!   values: [...]
//! treatment_success_perc:  # percent
//!   times: [...]
//!   values: [...]
//! ```

use std::path::Path;

use yaml_rust::Yaml;

use crate::data::yaml::{load_file, number_list};
use crate::domain::{TimeSeries, TimeVariantData};
use crate::error::AppError;

pub const TIME_VARIANT_FILE: &str = "time_variant_params.yml";

pub fn load_time_variant(path: &Path) -> Result<TimeVariantData, AppError> {
    let doc = load_file(path)?;
    parse_time_variant(&doc)
        .map_err(|e| AppError::input(format!("{} (in '{}')", e.message(), path.display())))
}

pub(crate) fn parse_time_variant(doc: &Yaml) -> Result<TimeVariantData, AppError> {
    Ok(TimeVariantData {
        crude_birth_rate: series(doc, "crude_birth_rate")?,
        life_expectancy: series(doc, "life_expectancy")?,
        treatment_success_perc: series(doc, "treatment_success_perc")?,
    })
}

fn series(doc: &Yaml, key: &str) -> Result<TimeSeries, AppError> {
    let node = &doc[key];
    if node.is_badvalue() {
        return Err(AppError::input(format!("Missing time-variant series '{key}'.")));
    }
    let times = number_list(node, "times", key)?;
    let values = number_list(node, "values", key)?;
    if times.is_empty() || times.len() != values.len() {
        return Err(AppError::input(format!(
            "Series '{key}' needs the same non-zero number of times and values ({} vs {}).",
            times.len(),
            values.len()
        )));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(AppError::input(format!("Series '{key}' times must be strictly increasing.")));
    }
    Ok(TimeSeries::new(times, values))
}
