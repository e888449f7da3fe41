use crate::csv_reader::TransactionRecord;

/// Mean and scale fitted for one numeric column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub scale: f64,
}

// Fit over the present values only; a constant (or empty) column gets scale 1
fn fit_column(values: &[f64]) -> ColumnStats {
    if values.is_empty() {
        return ColumnStats { mean: 0.0, scale: 1.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    ColumnStats {
        mean,
        scale: if std_dev > 0.0 { std_dev } else { 1.0 },
    }
}

/// Standardize every numeric attribute column in place to zero mean and unit
/// (population) variance. Missing values are skipped when fitting and stay
/// missing.
pub fn standardize(records: &mut [TransactionRecord]) -> Vec<ColumnStats> {
    let n_columns = records.first().map_or(0, |r| r.attributes.len());
    let mut stats = Vec::with_capacity(n_columns);

    for i in 0..n_columns {
        let column: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get(i).copied().flatten())
            .collect();
        let fitted = fit_column(&column);

        for record in records.iter_mut() {
            if let Some(Some(value)) = record.attributes.get_mut(i) {
                *value = (*value - fitted.mean) / fitted.scale;
            }
        }
        stats.push(fitted);
    }

    log::debug!("standardized {} numeric columns", stats.len());
    stats
}
