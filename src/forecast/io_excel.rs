// Reading polls from Excel workbooks.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::Duration;

use crate::forecast::*;

/// Reads the named worksheet, or the first one. The first row holds the
/// column names.
pub fn read_excel_table(path: &str, worksheet: Option<&str>) -> BFResult<PollTable> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = match worksheet {
        Some(name) => workbook.worksheet_range(name),
        None => workbook.worksheet_range_at(0),
    }
    .context(EmptyExcelSnafu { path })?
    .context(OpeningExcelSnafu { path })?;

    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    debug!("read_excel_table: header: {:?}", header);
    let headers: Vec<String> = header.iter().map(read_cell).collect();

    let rows: Vec<Vec<String>> = iter.map(|row| row.iter().map(read_cell).collect()).collect();
    Ok(PollTable::new(path, headers, rows))
}

fn read_cell(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.trim().to_string(),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(serial) => excel_date(*serial)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Excel stores dates as a number of days, counted so that 1 is 1900-01-01
/// (with the 1900 leap year bug, hence the offset).
fn excel_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert_eq!(excel_date(45595.0), NaiveDate::from_ymd_opt(2024, 10, 30));
        // The time of day is dropped.
        assert_eq!(excel_date(45595.75), NaiveDate::from_ymd_opt(2024, 10, 30));
        assert_eq!(excel_date(-1.0), None);
        assert_eq!(excel_date(f64::NAN), None);
    }

    #[test]
    fn cells() {
        assert_eq!(read_cell(&DataType::Float(2.9)), "2.9");
        assert_eq!(read_cell(&DataType::Float(48.0)), "48");
        assert_eq!(read_cell(&DataType::Int(3)), "3");
        assert_eq!(read_cell(&DataType::String(" lv ".to_string())), "lv");
        assert_eq!(read_cell(&DataType::DateTime(45595.0)), "2024-10-30");
        assert_eq!(read_cell(&DataType::Empty), "");
    }

    #[test]
    fn missing_workbook() {
        assert!(matches!(
            read_excel_table("/nonexistent/polls.xlsx", None).map_err(|e| *e),
            Err(ForecastError::OpeningExcel { .. })
        ));
    }
}
