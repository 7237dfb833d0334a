// Primitives for reading and writing CSV files.

use std::collections::HashMap;

use crate::forecast::*;

pub const PREDICTED_COLUMN: &str = "predicted_pct";

pub fn read_csv_table(path: &str) -> BFResult<PollTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let headers: Vec<String> = rdr
        .headers()
        .context(CsvLineParseSnafu { path, lineno: 1_usize })?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    debug!("read_csv_table: {}: {} rows", path, rows.len());
    Ok(PollTable::new(path, headers, rows))
}

/// Writes the rows of the table that have a prediction, with all their
/// original columns and the prediction in a last column. The rows keep the
/// order of the table.
pub fn predictions_to_csv(table: &PollTable, predictions: &[Prediction]) -> FResult<String> {
    let by_id: HashMap<&str, f64> = predictions
        .iter()
        .map(|p| (p.record.id.as_str(), p.predicted_pct))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = table.headers.clone();
    header.push(PREDICTED_COLUMN.to_string());
    wtr.write_record(&header)
        .context(CsvWriteSnafu { path: &table.path })?;
    for (row, id) in table.rows.iter().zip(table.ids.iter()) {
        if let Some(pred) = by_id.get(id.as_str()) {
            let mut line: Vec<String> = row.clone();
            line.resize(table.headers.len(), String::new());
            line.push(pred.to_string());
            wtr.write_record(&line)
                .context(CsvWriteSnafu { path: &table.path })?;
        }
    }
    let bytes = match wtr.into_inner() {
        Ok(b) => b,
        Err(e) => whatever!("Error flushing the predictions of {}: {}", table.path, e),
    };
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => whatever!("The predictions of {} are not valid UTF-8: {}", table.path, e),
    }
}
