//! Positional alignment of fixed literal fragments against noisy OCR lines.
//!
//! OCR noise on the combat log mostly substitutes or inserts single glyphs
//! and rarely reorders them, so the shift at which the most characters agree
//! locates a fragment inside a line without any dictionary.

use strsim::levenshtein;

use crate::config::AlignerKind;

/// Match counts per signed character offset.
///
/// Sized to the full offset range of the two strings it is built from.
#[derive(Debug)]
pub struct OffsetHistogram {
    min_offset: isize,
    counts: Vec<usize>,
    /// Offsets in the order they were first hit, for tie breaking.
    first_seen: Vec<isize>,
}

impl OffsetHistogram {
    pub fn new(min_offset: isize, max_offset: isize) -> Self {
        let buckets = (max_offset - min_offset + 1).max(0) as usize;
        Self {
            min_offset,
            counts: vec![0; buckets],
            first_seen: Vec::new(),
        }
    }

    pub fn record(&mut self, offset: isize) {
        let slot = (offset - self.min_offset) as usize;
        if self.counts[slot] == 0 {
            self.first_seen.push(offset);
        }
        self.counts[slot] += 1;
    }

    pub fn count(&self, offset: isize) -> usize {
        let slot = offset - self.min_offset;
        if slot < 0 {
            return 0;
        }
        self.counts.get(slot as usize).copied().unwrap_or(0)
    }

    /// Offset with the highest count; ties go to the offset seen first.
    pub fn peak(&self) -> Option<(isize, usize)> {
        let mut best: Option<(isize, usize)> = None;
        for &offset in &self.first_seen {
            let count = self.count(offset);
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((offset, count));
            }
        }
        best
    }
}

/// Split two strings into (shorter, longer); the line wins ties so that an
/// equal-length line is still the one being repaired.
fn order_pair(fragment: &str, line: &str) -> (Vec<char>, Vec<char>) {
    let fragment: Vec<char> = fragment.chars().collect();
    let line: Vec<char> = line.chars().collect();
    if fragment.len() <= line.len() {
        (fragment, line)
    } else {
        (line, fragment)
    }
}

/// Overwrite the best-aligned window of the longer string with the shorter one.
///
/// Only non-negative shifts are considered. If no character agrees at any
/// shift the longer string is returned untouched.
pub fn align_fragment(fragment: &str, line: &str) -> String {
    let (shorter, mut longer) = order_pair(fragment, line);
    if shorter.is_empty() {
        return longer.into_iter().collect();
    }

    let mut histogram = OffsetHistogram::new(0, longer.len() as isize - 1);
    for (i, ch) in shorter.iter().enumerate() {
        for j in i..longer.len() {
            if *ch == longer[j] {
                histogram.record((j - i) as isize);
            }
        }
    }

    if let Some((offset, _)) = histogram.peak() {
        let offset = offset as usize;
        for (i, ch) in shorter.iter().enumerate() {
            if let Some(slot) = longer.get_mut(offset + i) {
                *slot = *ch;
            }
        }
    }

    longer.into_iter().collect()
}

/// Peak agreement over every signed shift, divided by the shorter length.
///
/// Used as a cheap pre-check before a fragment is written into a line.
pub fn find_max_matching_index(a: &str, b: &str) -> f64 {
    let (shorter, longer) = order_pair(a, b);
    if shorter.is_empty() {
        return 0.0;
    }

    let mut histogram =
        OffsetHistogram::new(-(shorter.len() as isize - 1), longer.len() as isize - 1);
    for (i, ch) in shorter.iter().enumerate() {
        for (j, other) in longer.iter().enumerate() {
            if ch == other {
                histogram.record(j as isize - i as isize);
            }
        }
    }

    histogram
        .peak()
        .map_or(0.0, |(_, count)| count as f64 / shorter.len() as f64)
}

/// Score how well `candidate` carries `template` somewhere near its start.
///
/// Each template character is located by its first occurrence in the
/// candidate; the result is the share of characters that agree on the most
/// common shift.
pub fn template_score(candidate: &str, template: &str) -> f64 {
    let candidate: Vec<char> = candidate.chars().collect();
    let template: Vec<char> = template.chars().collect();
    if template.is_empty() {
        return 0.0;
    }

    let mut offsets: Vec<isize> = template
        .iter()
        .enumerate()
        .filter_map(|(t, ch)| {
            candidate
                .iter()
                .position(|c| c == ch)
                .map(|pos| pos as isize - t as isize)
        })
        .collect();
    if offsets.is_empty() {
        return 0.0;
    }
    offsets.sort_unstable();

    let mut best = 1;
    let mut run = 1;
    for pair in offsets.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
            best = best.max(run);
        } else {
            run = 1;
        }
    }

    best as f64 / template.len() as f64
}

/// Writes a clean fragment into the part of a noisy line it belongs to.
pub trait FragmentAligner: Send + Sync {
    fn align(&self, fragment: &str, line: &str) -> String;
}

pub struct OffsetHistogramAligner;

impl FragmentAligner for OffsetHistogramAligner {
    fn align(&self, fragment: &str, line: &str) -> String {
        align_fragment(fragment, line)
    }
}

/// Picks the fragment-sized window with the smallest edit distance.
///
/// Quadratic per window; kept for experiments, not the default.
pub struct EditDistanceAligner;

impl FragmentAligner for EditDistanceAligner {
    fn align(&self, fragment: &str, line: &str) -> String {
        let frag: Vec<char> = fragment.chars().collect();
        let mut chars: Vec<char> = line.chars().collect();
        if frag.is_empty() || chars.len() < frag.len() {
            return line.to_string();
        }

        let mut best: Option<(usize, usize)> = None;
        for start in 0..=chars.len() - frag.len() {
            let window: String = chars[start..start + frag.len()].iter().collect();
            let dist = levenshtein(fragment, &window);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((start, dist));
            }
        }

        if let Some((start, _)) = best {
            chars[start..start + frag.len()].copy_from_slice(&frag);
        }
        chars.into_iter().collect()
    }
}

pub fn aligner_for(kind: AlignerKind) -> Box<dyn FragmentAligner> {
    match kind {
        AlignerKind::OffsetHistogram => Box::new(OffsetHistogramAligner),
        AlignerKind::EditDistance => Box::new(EditDistanceAligner),
    }
}
