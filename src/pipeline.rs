use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::aggregate::sum_hits;
use crate::config::PipelineConfig;
use crate::corrector::LineCorrector;
use crate::events::{parse_event, CombatEvent};
use crate::logfile::{
    create_writer, open_reader, read_frame_blocks, write_events, write_frame_blocks, FrameBlock,
};
use crate::merge::FrameMerger;
use crate::ocr::{EngineFactory, TesseractFactory};
use crate::video::{FrameSource, VideoSource};
use crate::worker::{Dispatcher, ResultStore};

/// Stage 1 over any frame source: gated, concurrent OCR in frame order.
pub async fn extract_blocks<S: FrameSource>(
    source: &mut S,
    factory: Arc<dyn EngineFactory>,
    config: &PipelineConfig,
) -> Result<Vec<FrameBlock>> {
    let dispatcher = Dispatcher::new(factory, config);
    let store = Arc::new(ResultStore::new());
    dispatcher.run(source, &store).await?;
    Ok(store.take_sorted())
}

/// Stage 2: repair and classify every line, re-rendered as clean text.
///
/// Frames left without a recognizable line are dropped.
pub fn correct_blocks(raw: Vec<FrameBlock>, corrector: &LineCorrector) -> Vec<FrameBlock> {
    raw.into_iter()
        .filter_map(|block| {
            let lines: Vec<String> = block
                .lines
                .iter()
                .filter_map(|line| corrector.correct(line))
                .map(|kind| kind.render())
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(FrameBlock { lines, ..block })
            }
        })
        .collect()
}

/// Per-frame event lists in ascending frame order. Unrecognized lines are
/// dropped here and never reach the merger.
pub fn frame_events(mut blocks: Vec<FrameBlock>) -> Vec<Vec<CombatEvent>> {
    blocks.sort_by_key(|block| block.frame);
    blocks
        .into_iter()
        .map(|block| {
            block
                .lines
                .iter()
                .filter_map(|line| parse_event(line))
                .map(|kind| CombatEvent {
                    frame: block.frame,
                    timestamp: block.timestamp,
                    kind,
                })
                .collect::<Vec<_>>()
        })
        .filter(|events| !events.is_empty())
        .collect()
}

/// Stage 3: fold frame event lists into the canonical log.
pub fn clean_blocks(blocks: Vec<FrameBlock>, merger: &FrameMerger) -> Vec<CombatEvent> {
    merger.merge_all(frame_events(blocks))
}

pub async fn extract_file(video: &Path, output: &Path, config: &PipelineConfig) -> Result<()> {
    let roi = config
        .roi
        .context("No region of interest given (use --roi x,y,width,height)")?;
    let mut source = VideoSource::open(video, roi)?;
    let factory = Arc::new(TesseractFactory::from_config(&config.ocr));

    let blocks = extract_blocks(&mut source, factory, config).await?;
    write_frame_blocks(create_writer(output)?, &blocks)?;
    info!("Raw OCR log ({} frames) saved to {}", blocks.len(), output.display());
    Ok(())
}

pub fn correct_file(input: &Path, output: &Path, config: &PipelineConfig) -> Result<()> {
    let raw = read_frame_blocks(open_reader(input)?)?;
    let raw_lines: usize = raw.iter().map(|b| b.lines.len()).sum();

    let corrector = LineCorrector::new(&config.correction);
    let corrected = correct_blocks(raw, &corrector);
    let kept: usize = corrected.iter().map(|b| b.lines.len()).sum();

    write_frame_blocks(create_writer(output)?, &corrected)?;
    info!(
        "Data correction completed: {}/{} lines recognized, saved to {}",
        kept,
        raw_lines,
        output.display()
    );
    Ok(())
}

pub fn clean_file(input: &Path, output: &Path, config: &PipelineConfig) -> Result<()> {
    let blocks = read_frame_blocks(open_reader(input)?)?;
    let merger = FrameMerger::new(config.merge.clone());
    let events = clean_blocks(blocks, &merger);

    write_events(create_writer(output)?, &events)?;
    info!(
        "Cleaning complete: {} events saved to {}",
        events.len(),
        output.display()
    );
    Ok(())
}

pub fn sum_hits_file(input: &Path) -> Result<i64> {
    let total = sum_hits(open_reader(input)?)?;
    info!("Total damage from hits in {}: {}", input.display(), total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MergeConfig, PipelineConfig};
    use crate::events::EventKind;
    use crate::testing::{striped_crop, ScriptedSource, StripeFactory};

    #[test]
    fn one_orc_hit_survives_stutter() {
        // Five frames of drifting text; three OCR readings of the same hit,
        // each garbled somewhere else.
        let script = vec![
            "(Combat): You hlt Orc for 500 points of slashing damage.".to_string(),
            "Party: ready?".to_string(),
            "(Combat): You hit Orc for 500 points of slashing damaqe.".to_string(),
            String::new(),
            "(Combat): Y0u hit Orc for 500 points of slashing damage.".to_string(),
        ];
        let crops = (0..5).map(striped_crop).collect();
        let mut source = ScriptedSource::new(30.0, crops);
        let config = PipelineConfig {
            workers: Some(2),
            ..PipelineConfig::default()
        };
        let factory = Arc::new(StripeFactory { script });

        let raw = tokio_test::block_on(extract_blocks(&mut source, factory, &config)).unwrap();
        let frames: Vec<u64> = raw.iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![0, 2, 4]);

        let corrected = correct_blocks(raw, &LineCorrector::new(&config.correction));
        let log = clean_blocks(corrected, &FrameMerger::new(config.merge.clone()));

        assert_eq!(log.len(), 1);
        assert_eq!(log[0].frame, 0);
        assert_eq!(
            log[0].kind,
            EventKind::Hit {
                target: "Orc".into(),
                damage: "500".into(),
                damage_type: "slashing".into(),
            }
        );
    }

    #[test]
    fn stages_chain_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("combat_log_raw.txt");
        let corrected = dir.path().join("corrected_data.txt");
        let cleaned = dir.path().join("combat_log_cleaned.txt");

        std::fs::write(
            &raw,
            "---------------------------------\n\
             Frame: 1 | Time: 0.033s\n\
             (Combat): You attack Goblin. You roll a 14 (+5): you hit!\n\
             (Combat): You hit Goblin for 1,200 points of fire damage.\n\
             ---------------------------------\n\
             Frame: 2 | Time: 0.067s\n\
             (Combat): You hit Goblin for 1,200 points of fire damaqe.\n\
             (Combat): random noise\n\
             ---------------------------------\n\
             Frame: 3 | Time: 0.100s\n\
             (Combat): You hit Goblin for 35 points of cold damage.\n",
        )
        .unwrap();

        let config = PipelineConfig::default();
        correct_file(&raw, &corrected, &config).unwrap();
        let text = std::fs::read_to_string(&corrected).unwrap();
        assert!(text.contains("(Combat): You hit Goblin for 1200 points of fire damage.\n"));
        assert!(!text.contains("random noise"));

        clean_file(&corrected, &cleaned, &config).unwrap();
        let lines: Vec<String> = std::fs::read_to_string(&cleaned)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "Frame: 1 | Time: 0.033s | Type: attack | Goblin | 14 | 5 | hit |",
                "Frame: 1 | Time: 0.033s | Type: hit | Goblin | 1200 | fire |",
                "Frame: 3 | Time: 0.100s | Type: hit | Goblin | 35 | cold |",
            ]
        );

        assert_eq!(sum_hits_file(&cleaned).unwrap(), 1235);
    }

    #[test]
    fn frames_are_folded_in_frame_order() {
        let blocks = vec![
            FrameBlock {
                frame: 9,
                timestamp: 0.3,
                lines: vec!["(Combat): You hit Orc for 40 points of fire damage.".into()],
            },
            FrameBlock {
                frame: 4,
                timestamp: 0.13,
                lines: vec!["(Combat): You hit Orc for 40 points of fire damage.".into()],
            },
        ];
        let log = clean_blocks(blocks, &FrameMerger::new(MergeConfig::default()));
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].frame, 4);
    }

    #[tokio::test]
    async fn extraction_needs_a_roi() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_file(
            &dir.path().join("video.mkv"),
            &dir.path().join("raw.txt"),
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("region of interest"));
    }
}
