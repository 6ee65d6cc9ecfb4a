//! Line-oriented text formats passed between the stages.
//!
//! Raw and corrected logs share the frame-block layout:
//!
//! ```text
//! ---------------------------------
//! Frame: 12 | Time: 0.400s
//! (Combat): You hit Orc for 500 points of slashing damage.
//! ```
//!
//! The canonical log is one event per line:
//!
//! ```text
//! Frame: 12 | Time: 0.400s | Type: hit | Orc | 500 | slashing |
//! ```

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::events::CombatEvent;

pub const SEPARATOR: &str = "---------------------------------";

lazy_static! {
    static ref FRAME_HEADER_RE: Regex =
        Regex::new(r"^Frame:\s*(\d+)\s*\|\s*Time:\s*([\d.]+)s\s*$").expect("frame header pattern");
}

/// Lines recorded for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBlock {
    pub frame: u64,
    pub timestamp: f64,
    pub lines: Vec<String>,
}

fn frame_header(frame: u64, timestamp: f64) -> String {
    format!("Frame: {frame} | Time: {timestamp:.3}s")
}

pub fn write_frame_blocks<W: Write>(mut out: W, blocks: &[FrameBlock]) -> Result<()> {
    for block in blocks {
        writeln!(out, "{SEPARATOR}")?;
        writeln!(out, "{}", frame_header(block.frame, block.timestamp))?;
        for line in &block.lines {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn read_frame_blocks<R: BufRead>(input: R) -> Result<Vec<FrameBlock>> {
    let mut blocks: Vec<FrameBlock> = Vec::new();

    for (number, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("read error at line {}", number + 1))?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed == SEPARATOR {
            continue;
        }

        if let Some(caps) = FRAME_HEADER_RE.captures(trimmed) {
            // Both groups are all digits (and dots), so only overflow can fail here
            let frame = caps[1]
                .parse()
                .with_context(|| format!("bad frame number at line {}", number + 1))?;
            let timestamp = caps[2]
                .parse()
                .with_context(|| format!("bad timestamp at line {}", number + 1))?;
            blocks.push(FrameBlock {
                frame,
                timestamp,
                lines: Vec::new(),
            });
            continue;
        }

        match blocks.last_mut() {
            Some(block) => block.lines.push(trimmed.to_string()),
            None => debug!("line {} outside any frame block ignored", number + 1),
        }
    }

    Ok(blocks)
}

pub fn format_event(event: &CombatEvent) -> String {
    let mut line = format!(
        "{} | Type: {} |",
        frame_header(event.frame, event.timestamp),
        event.kind.type_name()
    );
    for field in event.kind.fields() {
        line.push(' ');
        line.push_str(field);
        line.push_str(" |");
    }
    line
}

pub fn write_events<W: Write>(mut out: W, events: &[CombatEvent]) -> Result<()> {
    for event in events {
        writeln!(out, "{}", format_event(event))?;
    }
    out.flush()?;
    Ok(())
}

pub fn open_reader(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    Ok(BufReader::new(file))
}

pub fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn frame_blocks_survive_a_file() {
        let blocks = vec![
            FrameBlock {
                frame: 3,
                timestamp: 0.1,
                lines: vec!["(Combat): You hit Orc for 5 points of fire damage.".into()],
            },
            FrameBlock {
                frame: 40,
                timestamp: 1.333,
                lines: vec!["(Cornbat): You attack Orc.".into(), "(Combat): x".into()],
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("raw.txt");
        write_frame_blocks(create_writer(&path).unwrap(), &blocks).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(&format!("{SEPARATOR}\nFrame: 3 | Time: 0.100s\n")));

        let read = read_frame_blocks(open_reader(&path).unwrap()).unwrap();
        assert_eq!(read, blocks);
    }

    #[test]
    fn reader_tolerates_loose_input() {
        let text = "stray line\n\nFrame:  7 | Time: 2.5s\n(Combat): a\n\n---\n";
        let blocks = read_frame_blocks(text.as_bytes()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].frame, 7);
        assert_eq!(blocks[0].timestamp, 2.5);
        assert_eq!(blocks[0].lines, vec!["(Combat): a", "---"]);
    }

    #[test]
    fn event_line_format() {
        let event = CombatEvent {
            frame: 12,
            timestamp: 0.4,
            kind: EventKind::Hit {
                target: "Orc".into(),
                damage: "500".into(),
                damage_type: "slashing".into(),
            },
        };
        assert_eq!(
            format_event(&event),
            "Frame: 12 | Time: 0.400s | Type: hit | Orc | 500 | slashing |"
        );
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_reader(&dir.path().join("absent.txt")).is_err());
    }
}
