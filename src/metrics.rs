// How each mpstat column is combined across the CPUs of a node.
//
// Utilization percentages are averaged, they do not add up across CPUs.  Per-second event rates
// (interrupts, softirqs) are summed, the node saw all of them.  The table is fixed and mirrors the
// column names sysstat prints; anything not in it can be classified from the command line, and is
// otherwise averaged.

use lazy_static::lazy_static;

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
}

lazy_static! {
    //+ignore-strings
    static ref COLUMN_AGGREGATION : HashMap<&'static str, Aggregation> = {
        let mut m = HashMap::new();

        // mpstat -u (the CPU table).  %user and %system are what older sysstat called %usr and
        // %sys.
        for name in [
            "%usr", "%user", "%nice", "%sys", "%system", "%iowait", "%irq", "%soft", "%steal",
            "%guest", "%gnice", "%idle",
        ] {
            m.insert(name, Aggregation::Mean);
        }

        // mpstat -I SUM and -I SCPU.
        for name in [
            "intr/s", "HI/s", "TIMER/s", "NET_TX/s", "NET_RX/s", "BLOCK/s", "IRQ_POLL/s",
            "BLOCK_IOPOLL/s", "TASKLET/s", "SCHED/s", "HRTIMER/s", "RCU/s",
        ] {
            m.insert(name, Aggregation::Sum);
        }

        // mpstat -I CPU, the named (architecture specific) interrupts.  Numbered interrupts are
        // handled by irq_number_column().
        for name in [
            "NMI/s", "LOC/s", "SPU/s", "PMI/s", "IWI/s", "RTR/s", "RES/s", "CAL/s", "TLB/s",
            "TRM/s", "THR/s", "DFR/s", "MCE/s", "MCP/s", "ERR/s", "MIS/s", "PIN/s", "NPI/s",
            "PIW/s",
        ] {
            m.insert(name, Aggregation::Sum);
        }

        m
    };
    //-ignore-strings
}

// "<digits>/s", the per-IRQ-line rate columns of mpstat -I CPU.
fn irq_number_column(name: &str) -> bool {
    match name.strip_suffix("/s") {
        Some(n) => !n.is_empty() && n.bytes().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

// The fixed table plus command line overrides.
#[derive(Debug, Default)]
pub struct Classifier {
    overrides: HashMap<String, Aggregation>,
}

impl Classifier {
    pub fn new() -> Classifier {
        Classifier::default()
    }

    // Later overrides replace earlier ones for the same name.
    pub fn with_override(mut self, name: &str, aggregation: Aggregation) -> Classifier {
        self.overrides.insert(name.to_string(), aggregation);
        self
    }

    // Returns the aggregation and whether the column was actually known.  Unknown columns are
    // averaged.
    pub fn classify(&self, name: &str) -> (Aggregation, bool) {
        if let Some(a) = self.overrides.get(name) {
            return (*a, true);
        }
        if let Some(a) = COLUMN_AGGREGATION.get(name) {
            return (*a, true);
        }
        if irq_number_column(name) {
            return (Aggregation::Sum, true);
        }
        (Aggregation::Mean, false)
    }
}

#[test]
pub fn test_classify() {
    let c = Classifier::new();
    assert!(c.classify("%usr") == (Aggregation::Mean, true));
    assert!(c.classify("%idle") == (Aggregation::Mean, true));
    assert!(c.classify("intr/s") == (Aggregation::Sum, true));
    assert!(c.classify("NET_RX/s") == (Aggregation::Sum, true));
    assert!(c.classify("LOC/s") == (Aggregation::Sum, true));
    assert!(c.classify("0/s") == (Aggregation::Sum, true));
    assert!(c.classify("124/s") == (Aggregation::Sum, true));
    assert!(c.classify("/s") == (Aggregation::Mean, false));
    assert!(c.classify("x1/s") == (Aggregation::Mean, false));
    assert!(c.classify("%frob") == (Aggregation::Mean, false));
}

#[test]
pub fn test_overrides() {
    let c = Classifier::new()
        .with_override("%frob", Aggregation::Sum)
        .with_override("intr/s", Aggregation::Mean);
    assert!(c.classify("%frob") == (Aggregation::Sum, true));
    assert!(c.classify("intr/s") == (Aggregation::Mean, true));
    assert!(c.classify("%usr") == (Aggregation::Mean, true));
}
