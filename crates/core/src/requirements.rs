//! Track requirement tables.
//!
//! Pure mappings from (track, milestone edge) to the official exams that
//! gate it. Milestones ("edges") split the 30 parts into brackets; finishing
//! a bracket requires one or more official exams before further progress.

use std::collections::BTreeSet;
use crate::exam::{OfficialCode, PartNumber};
use crate::student::Track;

/// Milestone edges for a track, ascending.
pub fn edge_numbers(track: Track) -> &'static [u8] {
    match track {
        Track::Regular => &[5, 10, 15, 20, 25, 30],
        Track::Intensive => &[10, 15, 20, 30],
    }
}

/// Official exams required when a track reaches `edge`.
///
/// Regular edges each require a single `F<edge/5>` exam. The intensive
/// terminal edge (30) requires three simultaneous exams.
pub fn required_official_codes(track: Track, edge: u8) -> BTreeSet<OfficialCode> {
    use OfficialCode::*;
    let codes: &[OfficialCode] = match (track, edge) {
        (Track::Regular, 5) => &[F1],
        (Track::Regular, 10) => &[F2],
        (Track::Regular, 15) => &[F3],
        (Track::Regular, 20) => &[F4],
        (Track::Regular, 25) => &[F5],
        (Track::Regular, 30) => &[F6],
        (Track::Intensive, 10) => &[T1],
        (Track::Intensive, 15) => &[H1],
        (Track::Intensive, 20) => &[T2],
        (Track::Intensive, 30) => &[T3, H2, Q],
        _ => &[],
    };
    codes.iter().copied().collect()
}

/// Every official exam a track must pass for full qualification.
pub fn full_qualification_set(track: Track) -> BTreeSet<OfficialCode> {
    use OfficialCode::*;
    match track {
        Track::Regular => [F1, F2, F3, F4, F5, F6].into_iter().collect(),
        Track::Intensive => [T1, T2, T3, H1, H2, Q].into_iter().collect(),
    }
}

/// The milestone edge an official code certifies (inverse of
/// [`required_official_codes`]).
pub fn edge_from_code(code: OfficialCode) -> u8 {
    use OfficialCode::*;
    match code {
        F1 => 5,
        F2 => 10,
        F3 => 15,
        F4 => 20,
        F5 => 25,
        F6 => 30,
        T1 => 10,
        H1 => 15,
        T2 => 20,
        T3 | H2 | Q => 30,
    }
}

/// The bracket `(prev, edge]` a part falls into for a track.
///
/// `prev` is 0 for the first bracket. Completing a milestone means passing
/// every part in `prev+1 ..= edge`.
pub fn bracket_for(track: Track, part: PartNumber) -> (u8, u8) {
    let mut prev = 0u8;
    for &edge in edge_numbers(track) {
        if part.get() <= edge {
            return (prev, edge);
        }
        prev = edge;
    }
    // Unreachable for valid parts: every edge table ends at 30.
    (prev, PartNumber::COUNT)
}
