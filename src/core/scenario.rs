//! Scenario matrices - alternative exchange amounts per named scenario
//!
//! A scenario file is a flat table with one row per exchange:
//!
//! ```text
//! from activity key | from database | to activity key | to database |
//! flow | flow database | exchange type | amount_default | <scenario>...
//! ```
//!
//! Biosphere rows name their input through `flow`/`flow database`; all
//! other rows through `from activity key`/`from database`. Any column not
//! listed above (or among the descriptive columns) is a scenario column, in
//! file order. Columns starting with `#` are ignored, rows whose first cell
//! starts with `*` are comments.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::core::error::CalcError;
use crate::core::frame::{Cell, Frame};
use crate::core::identity::FlowKey;
use crate::entities::ExchangeType;

pub const FROM_KEY: &str = "from activity key";
pub const FROM_DB: &str = "from database";
pub const TO_KEY: &str = "to activity key";
pub const TO_DB: &str = "to database";
pub const FLOW: &str = "flow";
pub const FLOW_DB: &str = "flow database";
pub const EXCHANGE_TYPE: &str = "exchange type";
pub const AMOUNT_DEFAULT: &str = "amount_default";

/// Descriptive columns that are never scenarios
const DESCRIPTIVE_COLUMNS: &[&str] = &[
    "from activity name",
    "from reference product",
    "from location",
    "from categories",
    "from unit",
    "to activity name",
    "to reference product",
    "to location",
    "to categories",
    "to unit",
    "flow name",
    "flow type",
    "unit",
];

const HEADER_SEARCH_ROWS: usize = 10;

/// How several scenario files are merged into one matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CombineMode {
    /// Every combination of scenarios across files
    #[default]
    Product,
    /// Scenarios present in every file, values overlaid
    Addition,
}

/// One exchange with a value per scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioExchange {
    pub input: FlowKey,
    pub output: FlowKey,
    pub kind: ExchangeType,
    /// `amount_default` column, NaN when absent
    pub default: f64,
    /// One value per scenario; NaN where the file left the cell empty
    pub values: Vec<f64>,
}

impl ScenarioExchange {
    fn identity(&self) -> ExchangeId {
        (self.input.clone(), self.output.clone(), self.kind)
    }

    /// Amount in scenario `k`: the scenario cell, else `amount_default`, else `None`
    pub fn amount(&self, k: usize) -> Option<f64> {
        match self.values.get(k) {
            Some(v) if v.is_finite() => Some(*v),
            _ if self.default.is_finite() => Some(self.default),
            _ => None,
        }
    }

    /// Value as it enters its matrix; technosphere inputs are negated
    pub fn matrix_amount(&self, k: usize) -> Option<f64> {
        self.amount(k).map(|v| v * self.kind.matrix_sign())
    }
}

type ExchangeId = (FlowKey, FlowKey, ExchangeType);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioMatrix {
    names: Vec<String>,
    rows: Vec<ScenarioExchange>,
    /// Row position by exchange identity
    index: HashMap<ExchangeId, usize>,
}

impl ScenarioMatrix {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn scenario_count(&self) -> usize {
        self.names.len()
    }

    pub fn rows(&self) -> &[ScenarioExchange] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add an exchange; a previous row with the same identity is replaced in place
    pub fn push(&mut self, row: ScenarioExchange) -> Result<(), CalcError> {
        if row.values.len() != self.names.len() {
            return Err(CalcError::incompatible(format!(
                "scenario row has {} values, expected {}",
                row.values.len(),
                self.names.len()
            )));
        }
        self.upsert(row);
        Ok(())
    }

    fn upsert(&mut self, row: ScenarioExchange) {
        match self.index.get(&row.identity()) {
            Some(&i) => self.rows[i] = row,
            None => {
                self.index.insert(row.identity(), self.rows.len());
                self.rows.push(row);
            }
        }
    }

    /// Load a CSV scenario file
    pub fn from_csv(path: &Path) -> Result<Self, CalcError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(mut reader: R) -> Result<Self, CalcError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        let lines: Vec<&str> = content.lines().collect();
        let header_line = lines
            .iter()
            .take(HEADER_SEARCH_ROWS)
            .position(|l| l.trim_start_matches('"').starts_with(FROM_KEY) || l.contains(TO_KEY))
            .ok_or_else(|| {
                CalcError::incompatible(format!(
                    "no header row containing '{}' in the first {} lines",
                    TO_KEY, HEADER_SEARCH_ROWS
                ))
            })?;
        let delimiter = sniff_delimiter(lines[header_line]);
        let body = lines[header_line..].join("\n");
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());
        let mut table = Vec::new();
        for record in rdr.records() {
            let record = record?;
            table.push(record.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }
        Self::from_table(table)
    }

    /// Load an XLSX scenario file; `sheet` defaults to the first sheet with a header row
    pub fn from_xlsx(path: &Path, sheet: Option<usize>) -> Result<Self, CalcError> {
        use calamine::{open_workbook_auto, Data, Reader};

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| CalcError::Store(format!("{}: {}", path.display(), e)))?;
        let sheet_names = workbook.sheet_names().to_vec();
        let candidates: Vec<String> = match sheet {
            Some(i) => vec![sheet_names
                .get(i)
                .cloned()
                .ok_or(CalcError::IndexOutOfRange {
                    axis: "sheet",
                    index: i,
                    len: sheet_names.len(),
                })?],
            None => sheet_names,
        };

        for name in candidates {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| CalcError::Store(format!("{} [{}]: {}", path.display(), name, e)))?;
            let table: Vec<Vec<String>> = range
                .rows()
                .map(|row| {
                    row.iter()
                        .map(|cell| match cell {
                            Data::Empty => String::new(),
                            Data::String(s) => s.clone(),
                            Data::Float(f) => f.to_string(),
                            Data::Int(i) => i.to_string(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .collect();
            let header = table
                .iter()
                .take(HEADER_SEARCH_ROWS)
                .position(|row| row.iter().any(|c| c.trim() == TO_KEY));
            if let Some(h) = header {
                return Self::from_table(table[h..].to_vec());
            }
        }
        Err(CalcError::incompatible(format!(
            "no sheet in {} has a '{}' header",
            path.display(),
            TO_KEY
        )))
    }

    /// Load by extension (`.csv`, `.xlsx`, `.xls`, `.ods`)
    pub fn from_path(path: &Path) -> Result<Self, CalcError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("xlsx") | Some("xls") | Some("ods") => Self::from_xlsx(path, None),
            _ => Self::from_csv(path),
        }
    }

    /// Parse a table whose first row is the header
    pub fn from_table(table: Vec<Vec<String>>) -> Result<Self, CalcError> {
        let mut iter = table.into_iter();
        let header: Vec<String> = iter
            .next()
            .ok_or_else(|| CalcError::incompatible("scenario table is empty"))?
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let col = |name: &str| header.iter().position(|h| h == name);
        let to_key = col(TO_KEY);
        let to_db = col(TO_DB);
        let kind_col = col(EXCHANGE_TYPE);
        let (from_key, from_db) = (col(FROM_KEY), col(FROM_DB));
        let (flow, flow_db) = (col(FLOW), col(FLOW_DB));
        let default_col = col(AMOUNT_DEFAULT);

        let (to_key, to_db, kind_col) = match (to_key, to_db, kind_col) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(CalcError::incompatible(format!(
                    "scenario table needs '{}', '{}' and '{}' columns",
                    TO_KEY, TO_DB, EXCHANGE_TYPE
                )))
            }
        };
        if (from_key.is_none() || from_db.is_none()) && (flow.is_none() || flow_db.is_none()) {
            return Err(CalcError::incompatible(format!(
                "scenario table needs '{}'/'{}' or '{}'/'{}' columns",
                FROM_KEY, FROM_DB, FLOW, FLOW_DB
            )));
        }

        let known = [
            FROM_KEY,
            FROM_DB,
            TO_KEY,
            TO_DB,
            FLOW,
            FLOW_DB,
            EXCHANGE_TYPE,
            AMOUNT_DEFAULT,
        ];
        let scenario_cols: Vec<usize> = header
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                !h.is_empty()
                    && !h.starts_with('#')
                    && !known.contains(&h.as_str())
                    && !DESCRIPTIVE_COLUMNS.contains(&h.as_str())
            })
            .map(|(i, _)| i)
            .collect();
        if scenario_cols.is_empty() {
            return Err(CalcError::incompatible("scenario table has no scenario columns"));
        }
        let names = scenario_cols
            .iter()
            .map(|&i| header[i].replace(['\n', '\r'], ""))
            .collect();

        let mut matrix = ScenarioMatrix::new(names);
        for (line, row) in iter.enumerate() {
            let line = line + 2;
            let cell = |i: Option<usize>| {
                i.and_then(|i| row.get(i))
                    .map(|s| s.trim())
                    .unwrap_or("")
            };
            if row.first().is_some_and(|c| c.trim_start().starts_with('*'))
                || row.iter().all(|c| c.trim().is_empty())
            {
                continue;
            }
            let kind: ExchangeType = cell(Some(kind_col)).parse().map_err(|e: String| {
                CalcError::incompatible(format!("scenario row {}: {}", line, e))
            })?;
            let from = key_from(cell(from_db), cell(from_key));
            let flow_key = key_from(cell(flow_db), cell(flow));
            let input = if kind == ExchangeType::Biosphere {
                flow_key.or(from)
            } else {
                from.or(flow_key)
            }
            .ok_or_else(|| {
                CalcError::incompatible(format!("scenario row {}: missing input key", line))
            })?;
            let output = key_from(cell(Some(to_db)), cell(Some(to_key))).ok_or_else(|| {
                CalcError::incompatible(format!("scenario row {}: missing output key", line))
            })?;
            let default = parse_amount(cell(default_col), line, AMOUNT_DEFAULT)?;
            let values = scenario_cols
                .iter()
                .map(|&i| parse_amount(cell(Some(i)), line, &header[i]))
                .collect::<Result<Vec<_>, _>>()?;
            matrix.push(ScenarioExchange {
                input,
                output,
                kind,
                default,
                values,
            })?;
        }
        Ok(matrix)
    }

    /// Merge several matrices into one
    pub fn combine(parts: Vec<ScenarioMatrix>, mode: CombineMode) -> Result<Self, CalcError> {
        let mut parts = parts.into_iter();
        let first = parts
            .next()
            .ok_or_else(|| CalcError::incompatible("no scenario files to combine"))?;
        let rest: Vec<ScenarioMatrix> = parts.collect();
        if rest.is_empty() {
            return Ok(first);
        }
        let all: Vec<ScenarioMatrix> = std::iter::once(first).chain(rest).collect();
        match mode {
            CombineMode::Product => Ok(combine_product(&all)),
            CombineMode::Addition => combine_addition(&all),
        }
    }

    /// Keep rows accepted by `keep`; returns how many were dropped
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&ScenarioExchange) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|r| keep(r));
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.identity(), i))
            .collect();
        before - self.rows.len()
    }

    pub fn to_frame(&self) -> Frame {
        let mut columns: Vec<String> = [
            FROM_KEY,
            FROM_DB,
            TO_KEY,
            TO_DB,
            EXCHANGE_TYPE,
            AMOUNT_DEFAULT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        columns.extend(self.names.iter().cloned());
        let mut frame = Frame::new("scenarios", columns);
        for row in &self.rows {
            let mut cells: Vec<Cell> = vec![
                row.input.code().into(),
                row.input.database().into(),
                row.output.code().into(),
                row.output.database().into(),
                row.kind.as_str().into(),
                row.default.into(),
            ];
            cells.extend(row.values.iter().map(|v| Cell::Number(*v)));
            frame.push_row(cells);
        }
        frame
    }
}

fn key_from(db: &str, code: &str) -> Option<FlowKey> {
    if db.is_empty() || code.is_empty() {
        None
    } else {
        Some(FlowKey::new(db, code))
    }
}

/// Empty cells are NaN; anything else must be a number
fn parse_amount(s: &str, line: usize, column: &str) -> Result<f64, CalcError> {
    if s.is_empty() {
        return Ok(f64::NAN);
    }
    s.parse().map_err(|_| {
        CalcError::incompatible(format!(
            "scenario row {}, column '{}': '{}' is not a number",
            line, column, s
        ))
    })
}

/// Pick the delimiter occurring most often in the header line
fn sniff_delimiter(header: &str) -> u8 {
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .unwrap_or(b',')
}

fn combine_product(parts: &[ScenarioMatrix]) -> ScenarioMatrix {
    // Combination indices: one scenario index per part
    let mut combos: Vec<Vec<usize>> = vec![Vec::new()];
    for part in parts {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                (0..part.scenario_count()).map(move |k| {
                    let mut c = prefix.clone();
                    c.push(k);
                    c
                })
            })
            .collect();
    }
    let names = combos
        .iter()
        .map(|combo| {
            combo
                .iter()
                .zip(parts)
                .map(|(&k, p)| p.names[k].as_str())
                .collect::<Vec<_>>()
                .join(" / ")
        })
        .collect();

    let mut out = ScenarioMatrix::new(names);
    for (p, part) in parts.iter().enumerate() {
        for row in &part.rows {
            let values: Vec<f64> = combos.iter().map(|combo| row.values[combo[p]]).collect();
            let merged = ScenarioExchange {
                values,
                ..row.clone()
            };
            out.upsert(merged);
        }
    }
    out
}

fn combine_addition(parts: &[ScenarioMatrix]) -> Result<ScenarioMatrix, CalcError> {
    let names: Vec<String> = parts[0]
        .names
        .iter()
        .filter(|n| parts[1..].iter().all(|p| p.names.contains(n)))
        .cloned()
        .collect();
    if names.is_empty() {
        return Err(CalcError::incompatible(
            "scenario files share no scenario names; cannot combine by addition",
        ));
    }
    let mut out = ScenarioMatrix::new(names.clone());
    for part in parts {
        let cols: Vec<usize> = names
            .iter()
            .filter_map(|n| part.names.iter().position(|m| m == n))
            .collect();
        for row in &part.rows {
            let merged = ScenarioExchange {
                values: cols.iter().map(|&c| row.values[c]).collect(),
                ..row.clone()
            };
            out.upsert(merged);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    const CSV: &str = "\
from activity key,from database,to activity key,to database,flow,flow database,exchange type,amount_default,#note,Low,High
b,fg,a,fg,,,technosphere,1,x,0.5,2
,,a,fg,co2,bio,biosphere,1,y,,3
b,fg,a,fg,,,technosphere,1,z,0.25,4
";

    #[test]
    fn test_parse_csv_with_comment_column_and_duplicates() {
        let m = ScenarioMatrix::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(m.names(), &["Low".to_string(), "High".to_string()]);
        assert_eq!(m.rows().len(), 2);
        // Last duplicate wins
        let techno = m
            .rows()
            .iter()
            .find(|r| r.kind == ExchangeType::Technosphere)
            .unwrap();
        assert_eq!(techno.values, vec![0.25, 4.0]);
        assert_eq!(techno.matrix_amount(0), Some(-0.25));
        let bio = m
            .rows()
            .iter()
            .find(|r| r.kind == ExchangeType::Biosphere)
            .unwrap();
        assert_eq!(bio.input, FlowKey::new("bio", "co2"));
        // Empty cell falls back to amount_default
        assert_eq!(bio.amount(0), Some(1.0));
    }

    #[test]
    fn test_semicolon_delimiter_and_preamble() {
        let csv = "exported scenarios\n\
from activity key;from database;to activity key;to database;exchange type;S1\n\
b;fg;a;fg;technosphere;3\n";
        let m = ScenarioMatrix::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(m.names(), &["S1".to_string()]);
        assert_eq!(m.rows()[0].amount(0), Some(3.0));
        assert!(m.rows()[0].default.is_nan());
    }

    #[test]
    fn test_missing_columns_incompatible() {
        let err = ScenarioMatrix::from_table(vec![vec!["to activity key".into()]]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incompatible);
    }

    #[test]
    fn test_combine_product_names_and_values() {
        let a = ScenarioMatrix::from_csv_reader(
            "from activity key,from database,to activity key,to database,exchange type,A1,A2\n\
             b,fg,a,fg,technosphere,1,2\n"
                .as_bytes(),
        )
        .unwrap();
        let b = ScenarioMatrix::from_csv_reader(
            "from activity key,from database,to activity key,to database,exchange type,B1,B2\n\
             c,fg,a,fg,technosphere,10,20\n"
                .as_bytes(),
        )
        .unwrap();
        let m = ScenarioMatrix::combine(vec![a, b], CombineMode::Product).unwrap();
        assert_eq!(m.names(), &["A1 / B1", "A1 / B2", "A2 / B1", "A2 / B2"]);
        assert_eq!(m.rows()[0].values, vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(m.rows()[1].values, vec![10.0, 20.0, 10.0, 20.0]);
    }

    #[test]
    fn test_combine_addition_intersects_names() {
        let a = ScenarioMatrix::from_csv_reader(
            "from activity key,from database,to activity key,to database,exchange type,S1,S2\n\
             b,fg,a,fg,technosphere,1,2\n"
                .as_bytes(),
        )
        .unwrap();
        let b = ScenarioMatrix::from_csv_reader(
            "from activity key,from database,to activity key,to database,exchange type,S2\n\
             b,fg,a,fg,technosphere,5\n"
                .as_bytes(),
        )
        .unwrap();
        let m = ScenarioMatrix::combine(vec![a, b], CombineMode::Addition).unwrap();
        assert_eq!(m.names(), &["S2".to_string()]);
        assert_eq!(m.rows().len(), 1);
        assert_eq!(m.rows()[0].values, vec![5.0]);
    }

    #[test]
    fn test_duplicate_heavy_table_keeps_first_position() {
        let mut table = vec![vec![
            FROM_KEY.to_string(),
            FROM_DB.into(),
            TO_KEY.into(),
            TO_DB.into(),
            EXCHANGE_TYPE.into(),
            "S1".into(),
        ]];
        for n in 0..5000 {
            let code = format!("p{}", n % 50);
            table.push(vec![
                code,
                "fg".into(),
                "a".into(),
                "fg".into(),
                "technosphere".into(),
                n.to_string(),
            ]);
        }
        let m = ScenarioMatrix::from_table(table).unwrap();
        assert_eq!(m.rows().len(), 50);
        assert_eq!(m.rows()[0].input, FlowKey::new("fg", "p0"));
        assert_eq!(m.rows()[0].values, vec![4950.0]);
        assert_eq!(m.rows()[49].values, vec![4999.0]);
    }

    #[test]
    fn test_non_numeric_cell_names_row_and_column() {
        for bad in ["1e-3x", "0,25"] {
            let csv = format!(
                "from activity key;from database;to activity key;to database;exchange type;amount_default;S1\n\
                 b;fg;a;fg;technosphere;0.5;{}\n",
                bad
            );
            let err = ScenarioMatrix::from_csv_reader(csv.as_bytes()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Incompatible);
            let message = err.to_string();
            assert!(message.contains("row 2"), "{}", message);
            assert!(message.contains("'S1'"), "{}", message);
        }
    }

    #[test]
    fn test_retain_counts_dropped() {
        let mut m = ScenarioMatrix::from_csv_reader(CSV.as_bytes()).unwrap();
        let dropped = m.retain(|r| r.kind == ExchangeType::Biosphere);
        assert_eq!(dropped, 1);
        assert_eq!(m.rows().len(), 1);
        m.push(ScenarioExchange {
            input: FlowKey::new("bio", "co2"),
            output: FlowKey::new("fg", "a"),
            kind: ExchangeType::Biosphere,
            default: 1.0,
            values: vec![7.0, 8.0],
        })
        .unwrap();
        assert_eq!(m.rows().len(), 1);
        assert_eq!(m.rows()[0].values, vec![7.0, 8.0]);
    }
}
