use crate::types::{BorderDataset, BorderRow};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// One hand-curated fix to the base border dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Patch {
    /// Merge the second country's shape into the first and drop the second row.
    Union { countries: [String; 2] },
    /// Take these countries' shapes from another dataset.
    Substitute { countries: Vec<String>, source: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("country {country:?} not found in dataset {dataset:?}")]
    MissingCountry { dataset: String, country: String },
    #[error("country {country:?} appears {count} times in dataset {dataset:?}")]
    DuplicateCountry {
        dataset: String,
        country: String,
        count: usize,
    },
    #[error("substitution source {dataset:?} is not loaded")]
    UnknownSource { dataset: String },
    #[error("union patch in dataset {dataset:?} names {country:?} twice")]
    SelfUnion { dataset: String, country: String },
    #[error("dataset {dataset:?} uses CRS {found:?} but the base uses {expected:?}")]
    CrsMismatch {
        dataset: String,
        expected: String,
        found: String,
    },
}

fn normalize_crs(crs: &str) -> String {
    crs.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_projected(crs: &str) -> bool {
    let root = crs.trim_start().to_ascii_uppercase();
    root.starts_with("PROJCS[") || root.starts_with("PROJCRS[")
}

/// Brings a secondary dataset's CRS in line with the base before any lookup
/// by assigning the base's CRS to it. Only a projected CRS paired with a
/// geographic one is refused, since the coordinates would not be comparable.
pub fn align_crs(base: &BorderDataset, source: &mut BorderDataset) -> Result<(), ReconcileError> {
    let expected = match &base.crs {
        Some(expected) => expected,
        None => {
            warn!("Base dataset '{}' declares no CRS; assuming '{}' matches", base.key, source.key);
            return Ok(());
        }
    };

    if let Some(found) = &source.crs {
        if is_projected(expected) != is_projected(found) {
            return Err(ReconcileError::CrsMismatch {
                dataset: source.key.clone(),
                expected: expected.clone(),
                found: found.clone(),
            });
        }
        if normalize_crs(expected) != normalize_crs(found) {
            warn!("CRS of '{}' is spelled differently from '{}'; using the base's", source.key, base.key);
        }
    }

    info!("Assigning CRS of '{}' to '{}'", base.key, source.key);
    source.crs = Some(expected.clone());
    Ok(())
}

/// Index of the single row named `country`.
fn find_unique(rows: &[BorderRow], dataset: &str, country: &str) -> Result<usize, ReconcileError> {
    let mut hits = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.name == country)
        .map(|(i, _)| i);

    match (hits.next(), hits.count()) {
        (Some(index), 0) => Ok(index),
        (Some(_), extra) => Err(ReconcileError::DuplicateCountry {
            dataset: dataset.to_string(),
            country: country.to_string(),
            count: extra + 1,
        }),
        (None, _) => Err(ReconcileError::MissingCountry {
            dataset: dataset.to_string(),
            country: country.to_string(),
        }),
    }
}

fn apply_union(rows: &mut Vec<BorderRow>, dataset: &str, keep: &str, absorb: &str) -> Result<(), ReconcileError> {
    if keep == absorb {
        return Err(ReconcileError::SelfUnion {
            dataset: dataset.to_string(),
            country: keep.to_string(),
        });
    }
    let keep_idx = find_unique(rows, dataset, keep)?;
    let absorb_idx = find_unique(rows, dataset, absorb)?;

    let merged = match (&rows[keep_idx].geometry, &rows[absorb_idx].geometry) {
        (Some(a), Some(b)) => Some(a.union(b)),
        (a, b) => a.clone().or_else(|| b.clone()),
    };
    rows[keep_idx].geometry = merged;
    rows.remove(absorb_idx);

    info!("Merged '{}' into '{}'", absorb, keep);
    Ok(())
}

fn apply_substitution(
    rows: &mut [BorderRow],
    dataset: &str,
    source: &BorderDataset,
    countries: &[String],
) -> Result<(), ReconcileError> {
    for country in countries {
        let idx = find_unique(rows, dataset, country)?;
        let source_idx = find_unique(&source.rows, &source.key, country)?;
        rows[idx].geometry = source.rows[source_idx].geometry.clone();
        info!("Replaced geometry of '{}' with the one from '{}'", country, source.key);
    }
    Ok(())
}

/// Applies the patch list to a copy of the base rows. Nothing is returned
/// unless every patch applied cleanly.
pub fn reconcile(
    base: &BorderDataset,
    sources: &mut BTreeMap<String, BorderDataset>,
    patches: &[Patch],
) -> Result<Vec<BorderRow>, ReconcileError> {
    let mut rows = base.rows.clone();

    for patch in patches {
        match patch {
            Patch::Union { countries: [keep, absorb] } => {
                apply_union(&mut rows, &base.key, keep, absorb)?;
            }
            Patch::Substitute { countries, source } => {
                let source = sources
                    .get_mut(source)
                    .ok_or_else(|| ReconcileError::UnknownSource { dataset: source.clone() })?;
                align_crs(base, source)?;
                apply_substitution(&mut rows, &base.key, source, countries)?;
            }
        }
    }

    info!("Reconciled {} rows into {}", base.rows.len(), rows.len());
    Ok(rows)
}
