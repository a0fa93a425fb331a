// Build the Topology from lscpu output.
//
// Two formats are understood.  The default human-readable report carries lines like
//
//   CPU(s):                  16
//   NUMA node(s):            2
//   NUMA node0 CPU(s):       0-7
//   NUMA node1 CPU(s):       8-15
//
// which newer versions indent under a "NUMA:" heading.  The parseable report (lscpu -p, or
// lscpu -p=CPU,NODE) has a comment line naming the columns followed by one comma-separated line
// per CPU:
//
//   # CPU,Core,Socket,Node,,L1d,L1i,L2,L3
//   0,0,0,0,,0,0,0,0
//
// The format is chosen by looking for that column-naming comment.

use crate::command;
use crate::cpulist;
use crate::topology::{CpuId, NodeId, Topology, TopologyError};

use std::fs;

// lscpu does not touch the hardware, it should never take this long.
const LSCPU_TIMEOUT_S: u64 = 10;

pub fn read_file(path: &str) -> Result<Topology, TopologyError> {
    let text = fs::read_to_string(path)
        .map_err(|e| TopologyError::Unreadable(path.to_string(), e.to_string()))?;
    parse(&text)
}

pub fn run_command(cmd: &str) -> Result<Topology, TopologyError> {
    let text = command::safe_command(cmd, LSCPU_TIMEOUT_S)
        .map_err(|e| TopologyError::Command(cmd.to_string(), e))?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<Topology, TopologyError> {
    let topo = if let Some((cpu_col, node_col)) = find_parseable_columns(text) {
        Topology::from_nodes(parse_parseable(text, cpu_col, node_col)?)?
    } else {
        let (nodes, counts) = parse_report(text)?;
        let topo = Topology::from_nodes(nodes)?;
        check_counts(&topo, &counts);
        topo
    };
    log::debug!(
        "Topology: {} CPUs on {} NUMA nodes",
        topo.num_cpus(),
        topo.num_nodes()
    );
    Ok(topo)
}

// The totals the report claims, used for sanity checking only.
#[derive(Default)]
struct Counts {
    cpus: Option<usize>,
    nodes: Option<usize>,
}

fn parse_report(text: &str) -> Result<(Vec<(NodeId, Vec<CpuId>)>, Counts), TopologyError> {
    let mut nodes = vec![];
    let mut counts = Counts::default();
    for l in text.lines() {
        let l = l.trim_start();
        let Some((key, value)) = l.split_once(':') else {
            continue;
        };
        let key = key.trim_end();
        if key == "CPU(s)" {
            counts.cpus = value.trim().parse::<usize>().ok();
        } else if key == "NUMA node(s)" {
            counts.nodes = value.trim().parse::<usize>().ok();
        } else if let Some(label) = key.strip_prefix("NUMA node") {
            let Some(n) = label.strip_suffix(" CPU(s)") else {
                continue;
            };
            let node = n
                .parse::<NodeId>()
                .map_err(|_| TopologyError::BadNodeLabel(l.to_string()))?;
            let cpus =
                cpulist::parse(value).map_err(|e| TopologyError::BadCpuList(l.to_string(), e))?;
            nodes.push((node, cpus));
        }
    }
    Ok((nodes, counts))
}

// Offline CPUs and memory-only nodes make these mismatch on healthy systems, so just warn.
fn check_counts(topo: &Topology, counts: &Counts) {
    if let Some(n) = counts.cpus {
        if n != topo.num_cpus() {
            log::warn!(
                "lscpu reports {n} CPUs but only {} are assigned to NUMA nodes",
                topo.num_cpus()
            );
        }
    }
    if let Some(n) = counts.nodes {
        if n != topo.num_nodes() {
            log::warn!(
                "lscpu reports {n} NUMA nodes but lists {} nodes",
                topo.num_nodes()
            );
        }
    }
}

// Returns the field indices of CPU and Node if this is `lscpu -p` output.  The last column-naming
// comment wins, the leading comments are free text.
fn find_parseable_columns(text: &str) -> Option<(usize, usize)> {
    let mut found = None;
    for l in text.lines() {
        let Some(comment) = l.strip_prefix('#') else {
            continue;
        };
        let names = comment.trim().split(',').collect::<Vec<&str>>();
        let cpu = names.iter().position(|n| n.eq_ignore_ascii_case("cpu"));
        let node = names.iter().position(|n| n.eq_ignore_ascii_case("node"));
        if let (Some(cpu), Some(node)) = (cpu, node) {
            found = Some((cpu, node));
        }
    }
    found
}

fn parse_parseable(
    text: &str,
    cpu_col: usize,
    node_col: usize,
) -> Result<Vec<(NodeId, Vec<CpuId>)>, TopologyError> {
    let mut nodes = vec![];
    for l in text.lines() {
        if l.starts_with('#') || l.trim().is_empty() {
            continue;
        }
        let fields = l.split(',').map(|f| f.trim()).collect::<Vec<&str>>();
        let bad = |why: &str| TopologyError::BadParseableRow(l.to_string(), why.to_string());
        if fields.len() <= cpu_col.max(node_col) {
            return Err(bad("too few fields"));
        }
        let cpu = fields[cpu_col]
            .parse::<CpuId>()
            .map_err(|_| bad("bad CPU number"))?;
        // No NUMA support in the kernel, everything is on one node.
        let node = if fields[node_col].is_empty() {
            0
        } else {
            fields[node_col]
                .parse::<NodeId>()
                .map_err(|_| bad("bad node number"))?
        };
        nodes.push((node, vec![cpu]));
    }
    Ok(nodes)
}
