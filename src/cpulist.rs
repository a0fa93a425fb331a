use crate::topology::CpuId;

// Expand a Linux cpulist into the CPU ids it denotes, in the order they appear.
//
// These lists show up in lscpu output ("NUMA node0 CPU(s): 0-3,8-11") and in sysfs.  The grammar
// is:
//
//   cpulist ::= "" | element ("," element)*
//   element ::= number | number "-" number
//   number  ::= <nonempty string of 0..9, to be interpreted as decimal>
//
// Surrounding whitespace is ignored, there is no whitespace inside the list.  A range a-b with
// a > b is an error, and so is a range longer than MAX_RANGE.

const MAX_RANGE: CpuId = 1 << 20;

pub fn parse(xs: &str) -> Result<Vec<CpuId>, String> {
    let xs = xs.trim();
    let mut p = CpulistParser {
        s: xs.as_bytes(),
        i: 0,
    };
    let mut a = vec![];
    if p.at_end() {
        return Ok(a);
    }
    p.element(&mut a)?;
    while p.eat(b',') {
        p.element(&mut a)?;
    }
    if !p.at_end() {
        return Err(format!("Trailing junk in cpulist `{xs}`"));
    }
    Ok(a)
}

struct CpulistParser<'a> {
    s: &'a [u8],
    i: usize,
}

impl CpulistParser<'_> {
    fn element(&mut self, a: &mut Vec<CpuId>) -> Result<(), String> {
        let first = self.number()?;
        if self.eat(b'-') {
            let last = self.number()?;
            if first > last {
                return Err(format!("Descending range {first}-{last} in cpulist"));
            }
            if last - first >= MAX_RANGE {
                return Err(format!("Range {first}-{last} in cpulist is too large"));
            }
            a.extend(first..=last);
        } else {
            a.push(first);
        }
        Ok(())
    }

    fn number(&mut self) -> Result<CpuId, String> {
        let start = self.i;
        while self.eat_digit() {}
        if start == self.i {
            return Err("Number expected in cpulist".to_string());
        }
        // Only ASCII digits were consumed, so the slice is valid utf8.
        let digits = std::str::from_utf8(&self.s[start..self.i]).unwrap_or_default();
        digits
            .parse::<CpuId>()
            .map_err(|_| format!("CPU number {digits} out of range"))
    }

    fn eat_digit(&mut self) -> bool {
        if !self.at_end() && self.s[self.i].is_ascii_digit() {
            self.i += 1;
            return true;
        }
        false
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek(c) {
            self.i += 1;
            return true;
        }
        false
    }

    fn peek(&self, c: u8) -> bool {
        !self.at_end() && self.s[self.i] == c
    }

    fn at_end(&self) -> bool {
        self.i == self.s.len()
    }
}

#[test]
pub fn test_parser() {
    assert!(parse("0-2,5").unwrap() == vec![0, 1, 2, 5]);
    assert!(parse("0-3,8-11").unwrap() == vec![0, 1, 2, 3, 8, 9, 10, 11]);
    assert!(parse("  7 \n").unwrap() == vec![7]);
    assert!(parse("4-4").unwrap() == vec![4]);
    assert!(parse("").unwrap().is_empty());
    assert!(parse("   ").unwrap().is_empty());

    assert!(parse("3-1").is_err());
    assert!(parse("1,").is_err());
    assert!(parse(",1").is_err());
    assert!(parse("1,,2").is_err());
    assert!(parse("1-").is_err());
    assert!(parse("-1").is_err());
    assert!(parse("1-2-3").is_err());
    assert!(parse("1 ,2").is_err());
    assert!(parse("x").is_err());
    assert!(parse("99999999999").is_err());
    assert!(parse("0-4294967295").is_err());
    assert!(parse("0-1048576").is_err());
    assert!(parse("0-1048575").unwrap().len() == 1 << 20);
}
