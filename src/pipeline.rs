use crate::flatten::{flatten_column, FlatCoords};
use crate::processing::{compute_densities, join_population};
use crate::reconcile::{reconcile, Patch};
use crate::types::{BorderDataset, CapitalRecord, CountryRecord, PopulationRow};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Everything the build needs, already in memory.
pub struct PipelineInputs {
    pub datasets: BTreeMap<String, BorderDataset>,
    pub base: String,
    pub patches: Vec<Patch>,
    pub population: Vec<PopulationRow>,
    pub capitals: Vec<CapitalRecord>,
}

#[derive(Debug)]
pub struct CanonicalDataset {
    pub records: Vec<CountryRecord>,
    pub xs: Vec<FlatCoords>,
    pub ys: Vec<FlatCoords>,
    pub capitals: Vec<CapitalRecord>,
}

/// load → patch → join → project → compute; flattening is done last, for display.
pub fn build_canonical_dataset(inputs: PipelineInputs) -> Result<CanonicalDataset> {
    let PipelineInputs { mut datasets, base, patches, population, capitals } = inputs;

    // 1. Reconcile borders against the patch list
    let base_dataset = datasets.remove(&base)
        .ok_or_else(|| anyhow!("Base dataset '{}' is not loaded", base))?;
    let rows = reconcile(&base_dataset, &mut datasets, &patches)?;

    // 2. Join population and compute density
    let mut records = join_population(rows, &population);
    compute_densities(&mut records);

    // 3. Flatten for the multi-polygon glyph
    let (xs, ys) = flatten_column(records.iter().map(|r| r.geometry.as_ref()));

    Ok(CanonicalDataset { records, xs, ys, capitals })
}
