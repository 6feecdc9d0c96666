use anyhow::Context;
use serde::Deserialize;

use crate::population::AgeDistribution;

#[derive(Debug, Deserialize)]
struct AgeRow {
    /// Lower edge of the age bin in years.
    age: f64,
    count: f64,
}

/// Load population by age from a CSV file with columns `age,count`, one row
/// per bin in increasing order of age.
pub fn load_age_distribution_csv(path: impl AsRef<std::path::Path>) -> anyhow::Result<AgeDistribution> {
    let path = path.as_ref();
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open age distribution CSV: {}", path.display()))?;
    let mut edges = Vec::new();
    let mut counts = Vec::new();
    for result in rdr.deserialize::<AgeRow>() {
        let row = result.with_context(|| format!("bad row in {}", path.display()))?;
        edges.push(row.age);
        counts.push(row.count);
    }
    let dist = AgeDistribution::new(edges, counts)
        .with_context(|| format!("invalid age distribution in {}", path.display()))?;
    Ok(dist)
}
