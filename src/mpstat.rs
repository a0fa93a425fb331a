// Recognize the lines of an mpstat report.
//
// `mpstat -P ALL 5` prints a banner, then blocks separated by blank lines, each block a header
// followed by one row per CPU plus an "all" row:
//
//   Linux 6.1.0 (host)   01/15/2024   _x86_64_   (8 CPU)
//
//   10:00:01 AM  CPU    %usr   %nice    %sys %iowait    %irq   %soft  %steal  %guest  %gnice   %idle
//   10:00:06 AM  all    1.00    0.00    0.50    0.00    0.00    0.00    0.00    0.00    0.00   98.50
//   10:00:06 AM    0    2.00    0.00    1.00    0.00    0.00    0.00    0.00    0.00    0.00   97.00
//   ...
//
//   Average:     CPU    %usr   %nice ...
//
// The time stamp is one token in 24-hour locales and two ("10:00:01 AM") otherwise, and the final
// summary uses "Average:".  With -A or -I the report alternates between several kinds of tables,
// each with its own header; tables that are not keyed by CPU (eg the NODE table of -N) have no
// "CPU" column.

use crate::metrics::{Aggregation, Classifier};
use crate::topology::CpuId;

#[derive(Debug, PartialEq)]
pub enum LineKind<'a> {
    Blank,
    // A header of a per-CPU table: the time stamp tokens, and the metric column names.
    CpuHeader(Vec<&'a str>, Vec<&'a str>),
    // A header of some other table.
    OtherHeader,
    // Banner, data rows, anything else.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub aggregation: Aggregation,
}

// The column layout established by the last CPU table header.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub stamp_tokens: usize,
    pub columns: Vec<Column>,
}

impl Schema {
    // Also returns the names the classifier does not know.
    pub fn new<'a>(
        stamp_tokens: usize,
        names: &[&'a str],
        classifier: &Classifier,
    ) -> (Schema, Vec<&'a str>) {
        let mut unknown = vec![];
        let columns = names
            .iter()
            .map(|name| {
                let (aggregation, known) = classifier.classify(name);
                if !known {
                    unknown.push(*name);
                }
                Column {
                    name: name.to_string(),
                    aggregation,
                }
            })
            .collect::<Vec<Column>>();
        (
            Schema {
                stamp_tokens,
                columns,
            },
            unknown,
        )
    }

    pub fn width(&self) -> usize {
        self.stamp_tokens + 1 + self.columns.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuField {
    All,
    Cpu(CpuId),
}

#[derive(Debug, PartialEq)]
pub struct Sample {
    pub stamp: String,
    pub cpu: CpuField,
    pub values: Vec<f64>,
}

#[derive(Debug, PartialEq)]
pub enum RowError {
    // (expected, actual) number of fields
    Width(usize, usize),
    BadCpu(String),
    BadValue(String),
}

impl RowError {
    pub fn describe(&self) -> String {
        match self {
            RowError::Width(expected, got) => format!("expected {expected} fields, got {got}"),
            RowError::BadCpu(s) => format!("bad CPU field `{s}`"),
            RowError::BadValue(s) => format!("bad value `{s}`"),
        }
    }
}

pub fn classify(line: &str) -> LineKind<'_> {
    let tokens = line.split_ascii_whitespace().collect::<Vec<&str>>();
    if tokens.is_empty() {
        return LineKind::Blank;
    }
    let k = stamp_tokens(&tokens);
    if k == 0 || tokens.len() < k + 2 {
        return LineKind::Other;
    }
    if tokens[k..].iter().any(|t| is_number(t)) {
        return LineKind::Other;
    }
    // A data row whose values are all unparseable ("nan") is still a data row.
    if tokens[k] == "all" || tokens[k].parse::<CpuId>().is_ok() {
        return LineKind::Other;
    }
    if tokens[k] == "CPU" {
        LineKind::CpuHeader(tokens[..k].to_vec(), tokens[k + 1..].to_vec())
    } else {
        LineKind::OtherHeader
    }
}

pub fn parse_row(schema: &Schema, line: &str) -> Result<Sample, RowError> {
    let tokens = line.split_ascii_whitespace().collect::<Vec<&str>>();
    if tokens.len() != schema.width() {
        return Err(RowError::Width(schema.width(), tokens.len()));
    }
    let k = schema.stamp_tokens;
    let cpu = match tokens[k] {
        "all" => CpuField::All,
        s => CpuField::Cpu(
            s.parse::<CpuId>()
                .map_err(|_| RowError::BadCpu(s.to_string()))?,
        ),
    };
    let mut values = Vec::with_capacity(schema.columns.len());
    for t in &tokens[k + 1..] {
        values.push(parse_value(t).ok_or_else(|| RowError::BadValue(t.to_string()))?);
    }
    Ok(Sample {
        stamp: tokens[..k].join(" "),
        cpu,
        values,
    })
}

// How many leading tokens make up the time stamp, 0 if the line does not start with one.
fn stamp_tokens(tokens: &[&str]) -> usize {
    if !tokens[0].contains(':') {
        return 0;
    }
    if tokens.len() > 1 && (tokens[1] == "AM" || tokens[1] == "PM") {
        2
    } else {
        1
    }
}

// Some locales print a decimal comma.  "inf" and "nan" are not numbers for our purposes.
fn parse_value(s: &str) -> Option<f64> {
    if !s.bytes().any(|c| c.is_ascii_digit()) {
        return None;
    }
    match s.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => s.replace(',', ".").parse::<f64>().ok(),
    }
}

fn is_number(s: &str) -> bool {
    parse_value(s).is_some()
}

#[test]
pub fn test_classify() {
    assert!(classify("") == LineKind::Blank);
    assert!(classify("   \t") == LineKind::Blank);
    assert!(
        classify("Linux 6.1.0-18-amd64 (zappa)   01/15/2024   _x86_64_   (8 CPU)") == LineKind::Other
    );
    assert!(
        classify("10:00:01 AM  CPU    %usr   %nice")
            == LineKind::CpuHeader(vec!["10:00:01", "AM"], vec!["%usr", "%nice"])
    );
    assert!(
        classify("10:00:01     CPU    intr/s")
            == LineKind::CpuHeader(vec!["10:00:01"], vec!["intr/s"])
    );
    assert!(
        classify("Average:     CPU    %usr") == LineKind::CpuHeader(vec!["Average:"], vec!["%usr"])
    );
    assert!(classify("10:00:01 PM  NODE    %usr   %nice") == LineKind::OtherHeader);
    assert!(classify("10:00:06 AM    0    2.00    0.00") == LineKind::Other);
    assert!(classify("10:00:06 AM  all    2.00    0.00") == LineKind::Other);
    assert!(classify("10:00:06 AM  all    -nan    -nan") == LineKind::Other);
    assert!(classify("10:00:06       3     nan     nan") == LineKind::Other);
    // A header needs at least one column
    assert!(classify("10:00:01 AM  CPU") == LineKind::Other);
}

#[test]
pub fn test_parse_row() {
    let (schema, unknown) = Schema::new(2, &["%usr", "intr/s", "%frob"], &Classifier::new());
    assert!(unknown == vec!["%frob"]);
    assert!(schema.width() == 6);
    assert!(schema.columns[1].aggregation == Aggregation::Sum);

    let s = parse_row(&schema, "10:00:06 AM   12  1.50  300.00  0,25").unwrap();
    assert!(s.stamp == "10:00:06 AM");
    assert!(s.cpu == CpuField::Cpu(12));
    assert!(s.values == vec![1.5, 300.0, 0.25]);

    let s = parse_row(&schema, "10:00:06 AM  all  1.50  300.00  0.25").unwrap();
    assert!(s.cpu == CpuField::All);

    assert!(parse_row(&schema, "10:00:06 AM  1  1.50  300.00").unwrap_err() == RowError::Width(6, 5));
    assert!(
        parse_row(&schema, "10:00:06 AM  x  1.50  300.00  0.25").unwrap_err()
            == RowError::BadCpu("x".to_string())
    );
    assert!(
        parse_row(&schema, "10:00:06 AM  1  1.50  nan  0.25").unwrap_err()
            == RowError::BadValue("nan".to_string())
    );
}
