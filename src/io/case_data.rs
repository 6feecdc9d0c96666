use std::path::Path;

use anyhow::Context;

use crate::data::{date_to_day, day_to_date, parse_date, DataFrame};

/// Load observed case counts.
///
/// Time comes from a `date` column (ISO `YYYY-MM-DD`) or, failing that, a
/// `t` column (days since 2020-01-01); every other column is numeric. Empty
/// cells are missing observations and load as NaN.
pub fn load_case_data_csv(path: impl AsRef<Path>) -> anyhow::Result<DataFrame> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open case data CSV: {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let (index, is_date) = match (position("date"), position("t")) {
        (Some(i), _) => (i, true),
        (None, Some(i)) => (i, false),
        (None, None) => anyhow::bail!("{} has neither a 'date' nor a 't' column", path.display()),
    };

    let value_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| *h != "date" && *h != "t")
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut t = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); value_columns.len()];
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let key = record.get(index).unwrap_or_default();
        let day = if is_date {
            date_to_day(parse_date(key)?)
        } else {
            key.parse::<f64>()
                .with_context(|| format!("row {}: bad time '{}'", line + 1, key))?
        };
        t.push(day);
        for (col, (i, _)) in columns.iter_mut().zip(&value_columns) {
            let field = record.get(*i).unwrap_or_default();
            let value = if field.is_empty() {
                f64::NAN
            } else {
                field
                    .parse::<f64>()
                    .with_context(|| format!("row {}: bad value '{}'", line + 1, field))?
            };
            col.push(value);
        }
    }

    anyhow::ensure!(
        t.windows(2).all(|w| w[1] > w[0]),
        "case data in {} must be sorted by time without repeats",
        path.display()
    );

    let mut frame = DataFrame::new(t);
    for ((_, name), values) in value_columns.into_iter().zip(columns) {
        frame.insert(name, values)?;
    }
    Ok(frame)
}

/// Write a frame as CSV with leading `t` and `date` columns.
pub fn write_frame_csv(path: impl AsRef<Path>, frame: &DataFrame) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV: {}", path.display()))?;

    let mut header = vec!["t".to_string(), "date".to_string()];
    header.extend(frame.column_names().map(str::to_string));
    wtr.write_record(&header)?;

    for (row, t) in frame.t.iter().enumerate() {
        let date = day_to_date(*t).map(|d| d.to_string()).unwrap_or_default();
        let mut record = vec![format!("{t}"), date];
        for values in frame.columns.values() {
            let v = values[row];
            record.push(if v.is_finite() { format!("{v}") } else { String::new() });
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
