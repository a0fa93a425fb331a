use crate::aggregate::{self, Aggregator, Options, UnmappedPolicy};
use crate::lscpu;
use crate::metrics::{Aggregation, Classifier};
use crate::output::Format;
use crate::topology::Topology;

use std::io;

// Two nodes: CPUs 0,1 on node 0 and 2,3 on node 1.
fn small_topology() -> Topology {
    lscpu::parse(std::include_str!("testdata/lscpu-p.txt")).expect("Test: Must have topology")
}

fn aggregate(topology: &Topology, options: Options, input: &str) -> String {
    let mut aggregator = Aggregator::new(topology, options);
    let mut output = Vec::new();
    aggregate::run(
        &mut io::Cursor::new(input.as_bytes()),
        &mut output,
        &mut aggregator,
    )
    .expect("Test: Must run");
    String::from_utf8(output).expect("Test: Must be utf8")
}

// Hands out its data one byte per read, like a slowly growing file being tailed.
struct Trickle<'a> {
    data: &'a [u8],
}

impl io::Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[0];
        self.data = &self.data[1..];
        Ok(1)
    }
}

// A full `mpstat -P ALL 5` run against an 8-CPU machine with the nodes interleaved.

#[test]
pub fn aggregate_report_test() {
    let topology = lscpu::parse(std::include_str!("testdata/lscpu-x86_64.txt")).unwrap();
    let input = std::include_str!("testdata/mpstat-x86_64.txt");
    let expect = std::include_str!("testdata/mpnode-x86_64.txt");
    let got = aggregate(&topology, Options::default(), input);
    assert!(got == expect);

    // Same input, same output
    let again = aggregate(&topology, Options::default(), input);
    assert!(again == got);
}

#[test]
pub fn aggregate_streaming_test() {
    let topology = lscpu::parse(std::include_str!("testdata/lscpu-x86_64.txt")).unwrap();
    let input = std::include_str!("testdata/mpstat-x86_64.txt");
    let whole = aggregate(&topology, Options::default(), input);

    // One line at a time
    let mut aggregator = Aggregator::new(&topology, Options::default());
    let mut output = Vec::new();
    for line in input.split_inclusive('\n') {
        aggregator.push_line(line, &mut output).unwrap();
    }
    aggregator.finish(&mut output).unwrap();
    assert!(String::from_utf8_lossy(&output) == whole);

    // One byte at a time
    let mut aggregator = Aggregator::new(&topology, Options::default());
    let mut output = Vec::new();
    let mut input = io::BufReader::with_capacity(
        1,
        Trickle {
            data: input.as_bytes(),
        },
    );
    aggregate::run(&mut input, &mut output, &mut aggregator).unwrap();
    assert!(String::from_utf8_lossy(&output) == whole);
}

// mpstat -A alternates between table kinds.  The CPU table is averaged, the interrupt table summed,
// and the NODE table (already per node) is copied.

#[test]
pub fn aggregate_schema_change_test() {
    let input = r#"Linux 6.1.0 (zappa)   01/15/2024   _x86_64_   (4 CPU)

13:00:01     CPU    %usr   %idle
13:00:02     all   35.00   65.00
13:00:02       0   40.00   60.00
13:00:02       1   60.00   40.00
13:00:02       2   10.00   90.00
13:00:02       3   30.00   70.00

13:00:01     CPU    intr/s
13:00:02     all  100.00
13:00:02       0   10.00
13:00:02       1   20.00
13:00:02       2   30.00
13:00:02       3   40.00

13:00:01    NODE    %usr   %idle
13:00:02     all   35.00   65.00
13:00:02       0   50.00   50.00
13:00:02       1   20.00   80.00
"#;
    let expect = r#"Linux 6.1.0 (zappa)   01/15/2024   _x86_64_   (4 CPU)

13:00:01    NODE    %usr   %idle
13:00:02     all   35.00   65.00
13:00:02       0   50.00   50.00
13:00:02       1   20.00   80.00

13:00:01    NODE  intr/s
13:00:02     all  100.00
13:00:02       0   30.00
13:00:02       1   70.00

13:00:01    NODE    %usr   %idle
13:00:02     all   35.00   65.00
13:00:02       0   50.00   50.00
13:00:02       1   20.00   80.00
"#;
    let got = aggregate(&small_topology(), Options::default(), input);
    assert!(got == expect);
}

// A node is written as soon as all its CPUs have reported, but never ahead of a lower node.

#[test]
pub fn aggregate_early_emission_test() {
    let topology = small_topology();
    let mut aggregator = Aggregator::new(&topology, Options::default());
    let mut output = Vec::new();

    aggregator.push_line("13:00:01     CPU    %usr\n", &mut output).unwrap();
    assert!(String::from_utf8_lossy(&output) == "13:00:01    NODE    %usr\n");
    output.clear();

    aggregator.push_line("13:00:02       0   40.00\n", &mut output).unwrap();
    assert!(output.is_empty());
    aggregator.push_line("13:00:02       1   60.00\n", &mut output).unwrap();
    assert!(String::from_utf8_lossy(&output) == "13:00:02       0   50.00\n");
    output.clear();

    // Next interval, node 1 completes first and has to wait for node 0
    aggregator.push_line("13:00:03       2   10.00\n", &mut output).unwrap();
    assert!(output.is_empty());
    aggregator.push_line("13:00:03       3   30.00\n", &mut output).unwrap();
    assert!(output.is_empty());
    aggregator.push_line("13:00:03       1   20.00\n", &mut output).unwrap();
    assert!(output.is_empty());
    aggregator.push_line("13:00:03       0   40.00\n", &mut output).unwrap();
    assert!(
        String::from_utf8_lossy(&output) == "13:00:03       0   30.00\n13:00:03       1   20.00\n"
    );
    output.clear();

    aggregator.finish(&mut output).unwrap();
    assert!(output.is_empty());
}

// A new time stamp closes the group even without a blank line, and a trailing incomplete group is
// written at the end of input.

#[test]
pub fn aggregate_incomplete_groups_test() {
    let input = "13:00:01     CPU    %usr\n\
                 13:00:02       0   40.00\n\
                 13:00:02       2   10.00\n\
                 13:00:03       1   20.00\n\
                 13:00:03       3   30.00";
    let expect = "13:00:01    NODE    %usr\n\
                  13:00:02       0   40.00\n\
                  13:00:02       1   10.00\n\
                  13:00:03       0   20.00\n\
                  13:00:03       1   30.00\n";
    let got = aggregate(&small_topology(), Options::default(), input);
    assert!(got == expect);
}

#[test]
pub fn aggregate_unmapped_test() {
    let input = "13:00:01     CPU    %usr\n\
                 13:00:02       0   40.00\n\
                 13:00:02      99    1.00\n\
                 13:00:02       1   60.00\n\
                 13:00:02       2   10.00\n\
                 13:00:02       3   30.00\n\
                 \n\
                 13:00:02     CPU    %usr\n\
                 13:00:03      99    7.00\n\
                 13:00:03       0   40.00\n\
                 13:00:03      98    9.00\n";
    let topology = small_topology();

    // Dropped
    let mut aggregator = Aggregator::new(&topology, Options::default());
    let mut output = Vec::new();
    aggregate::run(
        &mut io::Cursor::new(input.as_bytes()),
        &mut output,
        &mut aggregator,
    )
    .unwrap();
    let expect = "13:00:01    NODE    %usr\n\
                  13:00:02       0   50.00\n\
                  13:00:02       1   20.00\n\
                  \n\
                  13:00:02    NODE    %usr\n\
                  13:00:03       0   40.00\n";
    assert!(String::from_utf8_lossy(&output) == expect);
    // CPU 99 shows up twice.  The warning is issued only when the CPU first enters this set, so the
    // set holding each CPU once is what limits it to one warning per CPU.
    assert!(aggregator.unmapped_cpus() == vec![98, 99]);

    // Bucketed, after the real nodes
    let options = Options {
        unmapped: UnmappedPolicy::Bucket,
        ..Default::default()
    };
    let expect = "13:00:01    NODE    %usr\n\
                  13:00:02       0   50.00\n\
                  13:00:02       1   20.00\n\
                  13:00:02       -    1.00\n\
                  \n\
                  13:00:02    NODE    %usr\n\
                  13:00:03       0   40.00\n\
                  13:00:03       -    8.00\n";
    assert!(aggregate(&topology, options, input) == expect);
}

// Malformed and repeated rows are skipped and the stream goes on.

#[test]
pub fn aggregate_bad_rows_test() {
    let input = "13:00:01     CPU    %usr   %idle\n\
                 13:00:02       0   40.00   60.00\n\
                 13:00:02       1   60.00\n\
                 13:00:02       x   60.00   40.00\n\
                 13:00:02       0   99.00    1.00\n\
                 13:00:02       2   10.00   90.00\n\
                 13:00:02       3   abc!   70.00\n\
                 13:00:02       3   30.00   70.00\n";
    let expect = "13:00:01    NODE    %usr   %idle\n\
                  13:00:02       0   40.00   60.00\n\
                  13:00:02       1   20.00   80.00\n";
    let got = aggregate(&small_topology(), Options::default(), input);
    assert!(got == expect);
}

// Older sysstat prints nan when a counter has not moved.  Such a row is malformed, it must not be
// taken for the header of some other table.

#[test]
pub fn aggregate_nan_rows_test() {
    let input = "13:00:01     CPU    %usr   %idle\n\
                 13:00:02     all    -nan    -nan\n\
                 13:00:02       0   40.00   60.00\n\
                 13:00:02       1     nan     nan\n\
                 13:00:02       1   60.00   40.00\n\
                 13:00:02       2   10.00   90.00\n\
                 13:00:02       3   30.00   70.00\n";
    let expect = "13:00:01    NODE    %usr   %idle\n\
                  13:00:02       0   50.00   50.00\n\
                  13:00:02       1   20.00   80.00\n";
    let got = aggregate(&small_topology(), Options::default(), input);
    assert!(got == expect);
}

// Columns outside the table are averaged, and each name is warned about once even when several
// headers carry it.

#[test]
pub fn aggregate_unknown_columns_test() {
    let input = "13:00:01     CPU   %frob    %usr  %blah\n\
                 13:00:02       0    1.00   40.00   2.00\n\
                 13:00:02       1    3.00   60.00   4.00\n\
                 \n\
                 13:00:02     CPU   %frob\n\
                 13:00:03       2    5.00\n\
                 13:00:03       3    7.00\n";
    let topology = small_topology();
    let mut aggregator = Aggregator::new(&topology, Options::default());
    let mut output = Vec::new();
    aggregate::run(
        &mut io::Cursor::new(input.as_bytes()),
        &mut output,
        &mut aggregator,
    )
    .unwrap();
    let expect = "13:00:01    NODE   %frob    %usr   %blah\n\
                  13:00:02       0    2.00   50.00    3.00\n\
                  \n\
                  13:00:02    NODE   %frob\n\
                  13:00:03       1    6.00\n";
    assert!(String::from_utf8_lossy(&output) == expect);
    assert!(aggregator.unknown_columns() == vec!["%blah".to_string(), "%frob".to_string()]);
}

#[test]
pub fn aggregate_options_test() {
    let input = "13:00:01     CPU    %usr  intr/s\n\
                 13:00:02     all   35.00  100.00\n\
                 13:00:02       0   40.00   10.00\n\
                 13:00:02       1   60.00   20.00\n\
                 13:00:02       2   10.00   30.00\n\
                 13:00:02       3   30.00   40.00\n";

    // Classification overrides, and no "all" row
    let options = Options {
        skip_all: true,
        classifier: Classifier::new()
            .with_override("%usr", Aggregation::Sum)
            .with_override("intr/s", Aggregation::Mean),
        ..Default::default()
    };
    let expect = "13:00:01    NODE    %usr  intr/s\n\
                  13:00:02       0  100.00   15.00\n\
                  13:00:02       1   40.00   35.00\n";
    assert!(aggregate(&small_topology(), options, input) == expect);

    // CSV
    let options = Options {
        format: Format::Csv,
        ..Default::default()
    };
    let input = "Linux 6.1.0 (zappa)   01/15/2024   _x86_64_   (4 CPU)\n\n".to_string() + input;
    let expect = "timestamp,node,%usr,intr/s\n\
                  13:00:02,all,35.00,100.00\n\
                  13:00:02,0,50.00,30.00\n\
                  13:00:02,1,20.00,70.00\n";
    assert!(aggregate(&small_topology(), options, &input) == expect);
}
