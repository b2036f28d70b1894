//! Pointer advancement math.

use std::collections::BTreeSet;
use crate::exam::PartNumber;

/// Find the next part the student still owes, given the set of passed parts
/// and the part just passed.
///
/// Holes behind the pointer win over fresh parts ahead: a student who
/// recites out of order (say passes 5 and 6 while 4 is still unheard) is
/// sent back to 4 rather than on to 7, so no part is left permanently
/// skipped. When nothing is owed behind, the scan wraps forward cyclically
/// from `(from % 30) + 1`. With all 30 parts passed the pointer saturates at
/// 30, signifying full coverage.
pub fn next_gap(passed: &BTreeSet<PartNumber>, from: PartNumber) -> PartNumber {
    // Earliest hole at or behind the pointer takes priority.
    for n in 1..=from.get() {
        let p = PartNumber::new(n).expect("n in 1..=30");
        if !passed.contains(&p) {
            return p;
        }
    }

    // Otherwise scan forward with wrap-around until an unheard part shows up.
    let mut probe = (from.get() % PartNumber::COUNT) + 1;
    let mut steps = 0u8;
    loop {
        let p = PartNumber::new(probe).expect("probe in 1..=30");
        if steps == PartNumber::COUNT || !passed.contains(&p) {
            break;
        }
        probe = (probe % PartNumber::COUNT) + 1;
        steps += 1;
    }
    if steps == PartNumber::COUNT {
        // All 30 heard.
        PartNumber::new(PartNumber::COUNT).expect("30 is a valid part")
    } else {
        PartNumber::new(probe).expect("probe in 1..=30")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u8) -> PartNumber {
        PartNumber::new(n).unwrap()
    }

    fn set(parts: &[u8]) -> BTreeSet<PartNumber> {
        parts.iter().map(|&n| part(n)).collect()
    }

    #[test]
    fn advances_to_immediate_successor() {
        assert_eq!(next_gap(&set(&[1]), part(1)), part(2));
    }

    #[test]
    fn skips_already_passed_parts_ahead() {
        assert_eq!(next_gap(&set(&[1, 2, 3, 4]), part(2)), part(5));
    }

    #[test]
    fn hole_behind_wins_over_fresh_part_ahead() {
        // Passed {1,2,3,5,6} with a gap at 4: passing 6 points back at 4,
        // not onward to 7.
        assert_eq!(next_gap(&set(&[1, 2, 3, 5, 6]), part(6)), part(4));
    }

    #[test]
    fn resumes_forward_when_no_hole_behind() {
        let prior: Vec<u8> = (1..=11).collect();
        assert_eq!(next_gap(&set(&prior), part(11)), part(12));
    }

    #[test]
    fn saturates_at_30_when_all_passed() {
        let all: Vec<u8> = (1..=30).collect();
        assert_eq!(next_gap(&set(&all), part(12)), part(30));
        assert_eq!(next_gap(&set(&all), part(30)), part(30));
    }

    #[test]
    fn wraps_from_part_30() {
        assert_eq!(next_gap(&set(&[30]), part(30)), part(1));
    }
}
