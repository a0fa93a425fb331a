// Render aggregated rows, either in a layout that mimics mpstat (with NODE where mpstat has CPU)
// or as CSV for downstream tooling.
//
// Text layout: the time stamp padded to 11 columns, the row label right-aligned in 5, then one
// field of at least 8 columns per metric, always with a separating space.  This matches mpstat for
// ordinary values and stays readable when summed rates get wide.

use crate::mpstat::Schema;
use crate::topology::NodeId;
use crate::util::csv_quote;

use std::io;

const STAMP_WIDTH: usize = 11;
const LABEL_WIDTH: usize = 5;
const VALUE_WIDTH: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Csv,
}

// What goes in the NODE column.  The derived order puts the unmapped bucket after every real node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Label {
    All,
    Node(NodeId),
    Unmapped,
}

impl Label {
    fn render(&self) -> String {
        match self {
            Label::All => "all".to_string(),
            Label::Node(n) => n.to_string(),
            Label::Unmapped => "-".to_string(),
        }
    }
}

pub fn write_header(
    writer: &mut dyn io::Write,
    fmt: Format,
    stamp: &str,
    schema: &Schema,
) -> io::Result<()> {
    let mut s = match fmt {
        Format::Text => format!("{stamp:<STAMP_WIDTH$}{:>LABEL_WIDTH$}", "NODE"),
        Format::Csv => "timestamp,node".to_string(),
    };
    for c in &schema.columns {
        match fmt {
            Format::Text => s += &format!(" {:>VALUE_WIDTH$}", c.name),
            Format::Csv => {
                s.push(',');
                s += &csv_quote(&c.name);
            }
        }
    }
    s.push('\n');
    writer.write_all(s.as_bytes())
}

pub fn write_row(
    writer: &mut dyn io::Write,
    fmt: Format,
    stamp: &str,
    label: Label,
    values: &[f64],
) -> io::Result<()> {
    let mut s = match fmt {
        Format::Text => format!("{stamp:<STAMP_WIDTH$}{:>LABEL_WIDTH$}", label.render()),
        Format::Csv => format!("{},{}", csv_quote(stamp), label.render()),
    };
    for v in values {
        match fmt {
            Format::Text => s += &format!(" {v:>VALUE_WIDTH$.2}"),
            Format::Csv => s += &format!(",{v:.2}"),
        }
    }
    s.push('\n');
    writer.write_all(s.as_bytes())
}

// Lines we do not interpret (banner, separators, foreign tables) are copied in text mode only.
pub fn write_passthrough(writer: &mut dyn io::Write, fmt: Format, line: &str) -> io::Result<()> {
    match fmt {
        Format::Text => {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")
        }
        Format::Csv => Ok(()),
    }
}

#[cfg(test)]
fn test_schema() -> Schema {
    use crate::metrics::Classifier;
    Schema::new(2, &["%usr", "intr/s"], &Classifier::new()).0
}

#[test]
pub fn test_text() {
    let schema = test_schema();
    let mut output = Vec::new();
    write_header(&mut output, Format::Text, "10:00:01 AM", &schema).unwrap();
    write_row(&mut output, Format::Text, "10:00:06 AM", Label::Node(1), &[12.5, 123456.789]).unwrap();
    write_row(&mut output, Format::Text, "Average:", Label::Unmapped, &[0.0, 3.0]).unwrap();
    write_passthrough(&mut output, Format::Text, "").unwrap();
    let got = String::from_utf8_lossy(&output);
    let expect = concat!(
        "10:00:01 AM NODE    %usr  intr/s\n",
        "10:00:06 AM    1   12.50 123456.79\n",
        "Average:       -    0.00    3.00\n",
        "\n",
    );
    assert!(got == expect);
}

#[test]
pub fn test_csv() {
    let schema = test_schema();
    let mut output = Vec::new();
    write_passthrough(&mut output, Format::Csv, "Linux 6.1.0 (zappa)").unwrap();
    write_header(&mut output, Format::Csv, "10:00:01 AM", &schema).unwrap();
    write_row(&mut output, Format::Csv, "10:00:06 AM", Label::All, &[12.5, 3.0]).unwrap();
    let got = String::from_utf8_lossy(&output);
    let expect = concat!(
        "timestamp,node,%usr,intr/s\n",
        "10:00:06 AM,all,12.50,3.00\n",
    );
    assert!(got == expect);
}

#[test]
pub fn test_label_order() {
    assert!(Label::Node(0) < Label::Node(1));
    assert!(Label::Node(1000) < Label::Unmapped);
}
