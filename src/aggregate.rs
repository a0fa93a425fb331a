// The stream aggregator: turns an mpstat report into the same report with one row per NUMA node
// instead of one row per CPU.
//
// Input is consumed a line at a time and output is produced as soon as it is known, so this works
// on `mpstat -P ALL 5 | mpnode ...` and on `tail -f` of a growing log.  The aggregator is a small
// state machine: it is either waiting for the header of a per-CPU table, or collecting rows under
// the schema that header established.  Rows with the same time stamp form a group; the group for a
// node is written once every CPU of the node has reported, nodes in ascending order, and whatever
// is left is written when the group closes (blank line, new header, new time stamp, end of input).
//
// Rows that can't be used are logged and skipped, nothing here stops the stream.

use crate::metrics::{Aggregation, Classifier};
use crate::mpstat::{self, CpuField, LineKind, Schema};
use crate::output::{self, Format, Label};
use crate::topology::{CpuId, NodeId, Topology};

use std::collections::{BTreeMap, HashSet};
use std::io;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnmappedPolicy {
    // Rows for CPUs the topology does not know are ignored.
    Drop,
    // They are aggregated into an extra group labeled "-", after all the real nodes.
    Bucket,
}

pub struct Options {
    pub format: Format,
    pub unmapped: UnmappedPolicy,
    pub skip_all: bool,
    pub classifier: Classifier,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            format: Format::Text,
            unmapped: UnmappedPolicy::Drop,
            skip_all: false,
            classifier: Classifier::new(),
        }
    }
}

enum Section {
    AwaitingHeader,
    Collecting(Schema),
}

struct Accumulator {
    count: usize,
    sums: Vec<f64>,
}

impl Accumulator {
    fn new(width: usize) -> Accumulator {
        Accumulator {
            count: 0,
            sums: vec![0.0; width],
        }
    }

    fn add(&mut self, values: &[f64]) {
        self.count += 1;
        for (s, v) in self.sums.iter_mut().zip(values) {
            *s += v;
        }
    }

    fn values(&self, kinds: &[Aggregation]) -> Vec<f64> {
        self.sums
            .iter()
            .zip(kinds)
            .map(|(s, k)| match k {
                Aggregation::Sum => *s,
                Aggregation::Mean => *s / self.count as f64,
            })
            .collect()
    }
}

// The rows sharing one time stamp.
struct Group {
    stamp: String,
    kinds: Vec<Aggregation>,
    seen: HashSet<CpuId>,
    // Nodes with data that have not been written yet.
    nodes: BTreeMap<Label, Accumulator>,
    // Index into the aggregator's node order of the first node not yet written.
    next: usize,
}

impl Group {
    fn new(stamp: String, schema: &Schema) -> Group {
        Group {
            stamp,
            kinds: schema.columns.iter().map(|c| c.aggregation).collect(),
            seen: HashSet::new(),
            nodes: BTreeMap::new(),
            next: 0,
        }
    }

    // Write the complete nodes at the front of the node order.
    fn emit_ready(
        &mut self,
        topology: &Topology,
        order: &[NodeId],
        fmt: Format,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        while let Some(&node) = order.get(self.next) {
            let label = Label::Node(node);
            match self.nodes.get(&label) {
                Some(acc) if acc.count == topology.cpu_count(node) => {
                    output::write_row(writer, fmt, &self.stamp, label, &acc.values(&self.kinds))?;
                    self.nodes.remove(&label);
                    self.next += 1;
                }
                _ => break,
            }
        }
        Ok(())
    }

    // Write everything that is left.  Label order puts the unmapped bucket last.
    fn close(self, fmt: Format, writer: &mut dyn io::Write) -> io::Result<()> {
        for (label, acc) in &self.nodes {
            output::write_row(writer, fmt, &self.stamp, *label, &acc.values(&self.kinds))?;
        }
        Ok(())
    }
}

pub struct Aggregator<'a> {
    topology: &'a Topology,
    options: Options,
    order: Vec<NodeId>,
    section: Section,
    group: Option<Group>,
    reported_cpus: HashSet<CpuId>,
    reported_columns: HashSet<String>,
}

impl<'a> Aggregator<'a> {
    pub fn new(topology: &'a Topology, options: Options) -> Aggregator<'a> {
        Aggregator {
            topology,
            options,
            order: topology.nodes().collect(),
            section: Section::AwaitingHeader,
            group: None,
            reported_cpus: HashSet::new(),
            reported_columns: HashSet::new(),
        }
    }

    // Process one line of input, with or without its line terminator.
    pub fn push_line(&mut self, line: &str, writer: &mut dyn io::Write) -> io::Result<()> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fmt = self.options.format;
        match mpstat::classify(line) {
            LineKind::Blank => {
                self.close_group(writer)?;
                self.section = Section::AwaitingHeader;
                output::write_passthrough(writer, fmt, line)
            }
            LineKind::CpuHeader(stamp, names) => {
                self.close_group(writer)?;
                let (schema, unknown) = Schema::new(stamp.len(), &names, &self.options.classifier);
                // Warn once per name, not once per header.
                for name in unknown {
                    if self.reported_columns.insert(name.to_string()) {
                        log::warn!("Unknown column {name}, it will be averaged across CPUs");
                    }
                }
                log::debug!("CPU table with {} columns", schema.columns.len());
                output::write_header(writer, fmt, &stamp.join(" "), &schema)?;
                self.section = Section::Collecting(schema);
                Ok(())
            }
            LineKind::OtherHeader => {
                self.close_group(writer)?;
                self.section = Section::AwaitingHeader;
                output::write_passthrough(writer, fmt, line)
            }
            LineKind::Other => {
                if let Section::Collecting(_) = self.section {
                    self.data_row(line, writer)
                } else {
                    output::write_passthrough(writer, fmt, line)
                }
            }
        }
    }

    // End of input: write out the last group.
    pub fn finish(&mut self, writer: &mut dyn io::Write) -> io::Result<()> {
        self.close_group(writer)?;
        self.section = Section::AwaitingHeader;
        Ok(())
    }

    // The CPUs that were reported as missing from the topology, ascending.
    pub fn unmapped_cpus(&self) -> Vec<CpuId> {
        let mut cpus = self.reported_cpus.iter().copied().collect::<Vec<CpuId>>();
        cpus.sort();
        cpus
    }

    // The column names that were reported as missing from the sum/mean table, sorted.
    pub fn unknown_columns(&self) -> Vec<String> {
        let mut names = self.reported_columns.iter().cloned().collect::<Vec<String>>();
        names.sort();
        names
    }

    fn data_row(&mut self, line: &str, writer: &mut dyn io::Write) -> io::Result<()> {
        let Section::Collecting(ref schema) = self.section else {
            return Ok(());
        };
        let sample = match mpstat::parse_row(schema, line) {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("Skipping malformed row ({}): {line}", e.describe());
                return Ok(());
            }
        };
        let fmt = self.options.format;

        if self.group.as_ref().is_some_and(|g| g.stamp != sample.stamp) {
            if let Some(g) = self.group.take() {
                g.close(fmt, writer)?;
            }
        }
        let group = self
            .group
            .get_or_insert_with(|| Group::new(sample.stamp.clone(), schema));

        let cpu = match sample.cpu {
            CpuField::All => {
                if !self.options.skip_all {
                    output::write_row(writer, fmt, &sample.stamp, Label::All, &sample.values)?;
                }
                return Ok(());
            }
            CpuField::Cpu(cpu) => cpu,
        };
        let label = match self.topology.node_of(cpu) {
            Some(node) => Label::Node(node),
            None => {
                // Warn once per CPU.
                if self.reported_cpus.insert(cpu) {
                    log::warn!("CPU {cpu} is not on any NUMA node in the topology");
                }
                match self.options.unmapped {
                    UnmappedPolicy::Drop => return Ok(()),
                    UnmappedPolicy::Bucket => Label::Unmapped,
                }
            }
        };
        if !group.seen.insert(cpu) {
            log::warn!("Skipping repeated row for CPU {cpu}: {line}");
            return Ok(());
        }
        let width = group.kinds.len();
        group
            .nodes
            .entry(label)
            .or_insert_with(|| Accumulator::new(width))
            .add(&sample.values);
        group.emit_ready(self.topology, &self.order, fmt, writer)
    }

    fn close_group(&mut self, writer: &mut dyn io::Write) -> io::Result<()> {
        match self.group.take() {
            Some(g) => g.close(self.options.format, writer),
            None => Ok(()),
        }
    }
}

// Drive the aggregator from a reader until end of input, flushing the writer after every line so
// that a consumer downstream sees each node row as soon as it exists.  Invalid utf8 is replaced,
// not fatal.
pub fn run(
    input: &mut dyn io::BufRead,
    output: &mut dyn io::Write,
    aggregator: &mut Aggregator,
) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        aggregator.push_line(&String::from_utf8_lossy(&buf), output)?;
        output.flush()?;
    }
    aggregator.finish(output)?;
    output.flush()
}
