// The CPU-to-node mapping.  It is built once from the lscpu report and never changes afterwards;
// the aggregator only ever holds a shared reference to it.

use crate::command::CmdError;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type CpuId = u32;
pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq)]
pub enum TopologyError {
    // No "NUMA nodeN CPU(s):" lines and no parseable rows either.
    NoNodes,
    // A CPU is listed on two different nodes: (cpu, first node, second node).
    Conflict(CpuId, NodeId, NodeId),
    // Bad cpulist: (offending line, reason).
    BadCpuList(String, String),
    // Could not get a node number out of a "NUMA nodeN CPU(s):" label.
    BadNodeLabel(String),
    // Bad data line in `lscpu -p` output: (offending line, reason).
    BadParseableRow(String, String),
    // The report could not be read: (source, reason).
    Unreadable(String, String),
    // The report-producing command failed.
    Command(String, CmdError),
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::NoNodes => write!(f, "No NUMA node information in lscpu output"),
            TopologyError::Conflict(cpu, a, b) => {
                write!(f, "CPU {cpu} is claimed by both node {a} and node {b}")
            }
            TopologyError::BadCpuList(line, why) => write!(f, "{why}: `{line}`"),
            TopologyError::BadNodeLabel(line) => write!(f, "Bad NUMA node label: `{line}`"),
            TopologyError::BadParseableRow(line, why) => {
                write!(f, "Bad lscpu -p row ({why}): `{line}`")
            }
            TopologyError::Unreadable(source, why) => write!(f, "Can't read {source}: {why}"),
            TopologyError::Command(cmd, e) => write!(f, "Command `{cmd}` failed: {e:?}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Topology {
    cpu_node: BTreeMap<CpuId, NodeId>,
    node_cpus: BTreeMap<NodeId, BTreeSet<CpuId>>,
}

impl Topology {
    // Build the mapping from (node, cpus) pairs.  A node may appear more than once, its CPUs are
    // unioned.  A node with an empty CPU list is remembered but never gets any data.
    pub fn from_nodes(nodes: Vec<(NodeId, Vec<CpuId>)>) -> Result<Topology, TopologyError> {
        if nodes.is_empty() {
            return Err(TopologyError::NoNodes);
        }
        let mut t = Topology::default();
        for (node, cpus) in nodes {
            let members = t.node_cpus.entry(node).or_default();
            for cpu in cpus {
                match t.cpu_node.get(&cpu) {
                    Some(&other) if other != node => {
                        return Err(TopologyError::Conflict(cpu, other, node));
                    }
                    Some(_) => {}
                    None => {
                        t.cpu_node.insert(cpu, node);
                    }
                }
                members.insert(cpu);
            }
        }
        Ok(t)
    }

    pub fn node_of(&self, cpu: CpuId) -> Option<NodeId> {
        self.cpu_node.get(&cpu).copied()
    }

    // Number of CPUs on the node, 0 for unknown nodes.
    pub fn cpu_count(&self, node: NodeId) -> usize {
        self.node_cpus.get(&node).map_or(0, |cpus| cpus.len())
    }

    // Nodes that have at least one CPU, ascending.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_cpus
            .iter()
            .filter(|(_, cpus)| !cpus.is_empty())
            .map(|(node, _)| *node)
    }

    pub fn num_nodes(&self) -> usize {
        self.node_cpus.len()
    }

    pub fn num_cpus(&self) -> usize {
        self.cpu_node.len()
    }
}

#[test]
pub fn test_from_nodes() {
    let t = Topology::from_nodes(vec![(0, vec![0, 1, 2]), (1, vec![3, 4]), (2, vec![])]).unwrap();
    assert!(t.node_of(0) == Some(0));
    assert!(t.node_of(4) == Some(1));
    assert!(t.node_of(5).is_none());
    assert!(t.cpu_count(0) == 3);
    assert!(t.cpu_count(2) == 0);
    assert!(t.cpu_count(7) == 0);
    assert!(t.nodes().collect::<Vec<NodeId>>() == vec![0, 1]);
    assert!(t.num_nodes() == 3);
    assert!(t.num_cpus() == 5);
}

#[test]
pub fn test_from_nodes_union() {
    let t = Topology::from_nodes(vec![(0, vec![0, 1]), (0, vec![1, 2])]).unwrap();
    assert!(t.cpu_count(0) == 3);
    assert!(t.num_cpus() == 3);
}

#[test]
pub fn test_from_nodes_errors() {
    assert!(Topology::from_nodes(vec![]).unwrap_err() == TopologyError::NoNodes);
    assert!(
        Topology::from_nodes(vec![(0, vec![0, 1]), (1, vec![1, 2])]).unwrap_err()
            == TopologyError::Conflict(1, 0, 1)
    );
}
