// Primitives shared by the readers.

use std::collections::HashSet;

use crate::forecast::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

/// A table as read from a file: a header row and text cells.
///
/// The rows are kept as read so that the predictions can be written next to
/// the original columns.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PollTable {
    pub path: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// One identifier per row, filled by `raw_polls`.
    pub ids: Vec<String>,
}

const REQUIRED_COLUMNS: [&str; 5] = [
    "pollster",
    "candidate_name",
    "population",
    "numeric_grade",
    "end_date",
];

impl PollTable {
    pub fn new(path: &str, headers: Vec<String>, rows: Vec<Vec<String>>) -> PollTable {
        PollTable {
            path: path.to_string(),
            headers,
            rows,
            ids: vec![],
        }
    }

    /// The index of a column, ignoring case and surrounding spaces.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    fn required_column(&self, name: &str) -> FResult<usize> {
        self.column(name).context(MissingColumnSnafu {
            path: self.path.clone(),
            column: name,
        })
    }

    /// Converts the rows to raw polls, and records the identifier of each
    /// row.
    ///
    /// The identifiers come from `id_column` if given, else from an `id`
    /// column if there is one, else they are made from the file name and
    /// the line number.
    pub fn raw_polls(&mut self, id_column: Option<&str>) -> FResult<Vec<RawPoll>> {
        for c in REQUIRED_COLUMNS {
            self.required_column(c)?;
        }
        let id_idx = match id_column {
            Some(c) => Some(self.required_column(c)?),
            None => self.column("id"),
        };
        let default_id = make_default_id(&self.path);
        let cell = |row: &Vec<String>, name: &str| -> Option<String> {
            self.column(name)
                .and_then(|idx| row.get(idx))
                .map(|s| s.to_string())
        };

        let mut ids: Vec<String> = Vec::with_capacity(self.rows.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut res: Vec<RawPoll> = Vec::with_capacity(self.rows.len());
        for (idx, row) in self.rows.iter().enumerate() {
            // Line 1 is the header.
            let lineno = idx + 2;
            let id = match id_idx.and_then(|i| row.get(i)).map(|s| s.trim()) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => default_id(lineno),
            };
            if !seen.insert(id.clone()) {
                return DuplicateIdSnafu {
                    path: self.path.clone(),
                    id,
                }
                .fail();
            }
            res.push(RawPoll {
                id: Some(id.clone()),
                pollster: cell(row, "pollster"),
                candidate_name: cell(row, "candidate_name"),
                population: cell(row, "population"),
                numeric_grade: cell(row, "numeric_grade"),
                end_date: cell(row, "end_date"),
                pct: cell(row, "pct"),
                state: cell(row, "state"),
                national: cell(row, "national"),
            });
            ids.push(id);
        }
        self.ids = ids;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> PollTable {
        PollTable::new(
            "data/polls.csv",
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    const HEADERS: [&str; 6] = [
        "Pollster",
        "candidate_name",
        "population",
        "numeric_grade",
        "end_date",
        "pct",
    ];

    #[test]
    fn default_ids() {
        assert_eq!(simplify_file_name("data/polls.csv"), "polls.csv");
        let mut t = table(
            &HEADERS,
            &[
                &["Siena", "Harris", "lv", "3.0", "10/30/24", "48"],
                &["Emerson", "Harris", "rv", "2.9", "10/29/24"],
            ],
        );
        let raw = t.raw_polls(None).unwrap();
        assert_eq!(raw[0].id.as_deref(), Some("polls.csv-00000002"));
        assert_eq!(raw[0].pollster.as_deref(), Some("Siena"));
        assert_eq!(raw[0].state, None);
        // Short rows read as missing cells.
        assert_eq!(raw[1].pct, None);
        assert_eq!(t.ids, vec!["polls.csv-00000002", "polls.csv-00000003"]);
    }

    #[test]
    fn id_column() {
        let mut headers = HEADERS.to_vec();
        headers.push("poll_id");
        let mut t = table(
            &headers,
            &[
                &["Siena", "Harris", "lv", "3.0", "10/30/24", "48", "x1"],
                &["Siena", "Harris", "lv", "3.0", "10/30/24", "48", ""],
            ],
        );
        let raw = t.raw_polls(Some("poll_id")).unwrap();
        assert_eq!(raw[0].id.as_deref(), Some("x1"));
        assert_eq!(raw[1].id.as_deref(), Some("polls.csv-00000003"));
    }

    #[test]
    fn schema_errors() {
        let mut t = table(&["pollster", "pct"], &[]);
        assert!(matches!(
            t.raw_polls(None),
            Err(ForecastError::MissingColumn { .. })
        ));

        let mut headers = HEADERS.to_vec();
        headers.push("id");
        let row: &[&str] = &["Siena", "Harris", "lv", "3.0", "10/30/24", "48", "a"];
        let mut t = table(&headers, &[row, row]);
        assert!(matches!(
            t.raw_polls(None),
            Err(ForecastError::DuplicateId { .. })
        ));
    }
}
