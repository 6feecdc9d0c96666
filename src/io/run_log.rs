use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::data::{day_to_date, DataFrame};
use crate::params::{ParamValue, ParameterSet};

/// Plain-text record of one simulation: a `key=value` header with the inputs,
/// then the requested output columns as CSV.
pub fn write_run_log(
    out_dir: impl AsRef<Path>,
    run_id: &str,
    simulator: &str,
    params: &ParameterSet,
    frame: &DataFrame,
    columns: &[&str],
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir.as_ref()).context("create logs dir failed")?;
    let path = out_dir.as_ref().join(format!("run_{}.txt", run_id));
    let mut f = std::fs::File::create(&path)
        .with_context(|| format!("create run log file failed (path={:?})", path))?;

    writeln!(f, "run_id={}", run_id)?;
    writeln!(f, "simulator={}", simulator)?;
    for key in params.keys() {
        match params.get(key) {
            Some(ParamValue::Scalar(v)) => writeln!(f, "{}={:.6}", key, v)?,
            Some(ParamValue::Vector(v)) => {
                let parts: Vec<String> = v.iter().map(|x| format!("{:.6}", x)).collect();
                writeln!(f, "{}=[{}]", key, parts.join(" "))?
            }
            None => {}
        }
    }
    writeln!(f)?;

    let series: Vec<&[f64]> = columns
        .iter()
        .map(|name| {
            frame
                .column(name)
                .with_context(|| format!("model output has no column '{}'", name))
        })
        .collect::<anyhow::Result<_>>()?;

    writeln!(f, "t,date,{}", columns.join(","))?;
    for (row, t) in frame.t.iter().enumerate() {
        let date = day_to_date(*t).map(|d| d.to_string()).unwrap_or_default();
        write!(f, "{:.6},{}", t, date)?;
        for values in &series {
            write!(f, ",{:.6}", values[row])?;
        }
        writeln!(f)?;
    }

    Ok(path)
}
