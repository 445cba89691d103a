//! Changed-block counting and motion confirmation.
//!
//! A frame is a *candidate* when its changed-block count falls inside
//! `[image_threshold_low, image_threshold_high]`. Counts above the band
//! are discarded exactly like counts below it: a whole-frame change is
//! far more likely to be a lighting change than an intruder.

use crate::config::Thresholds;

use super::grid::BlockGrid;
use super::mask::MaskGrid;

/// Counts blocks inside active mask cells whose luminance moved by more
/// than `block_threshold` between `previous` and `current`.
pub fn count_changed_blocks(
    current: &BlockGrid,
    previous: &BlockGrid,
    mask: &MaskGrid,
    block_threshold: u8,
) -> u16 {
    let mut changed = 0u16;
    for row in 0..current.rows() {
        for column in 0..current.columns() {
            if !mask.block_active(column, row) {
                continue;
            }
            let delta = current.get(column, row).abs_diff(previous.get(column, row));
            if delta > block_threshold {
                changed += 1;
            }
        }
    }
    changed
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Count outside the band; the consecutive counter was reset.
    Rejected { changed: u16 },
    /// In-band frame that has not yet reached the required run length.
    Candidate { changed: u16, consecutive: u8 },
    /// Required run reached; the counter was reset.
    Fired { changed: u16 },
}

impl Classification {
    pub fn changed_blocks(&self) -> u16 {
        match *self {
            Self::Rejected { changed }
            | Self::Candidate { changed, .. }
            | Self::Fired { changed } => changed,
        }
    }

    pub fn fired(&self) -> bool {
        matches!(self, Self::Fired { .. })
    }
}

/// Applies the band and consecutive-frame policy.
#[derive(Debug, Clone, Default)]
pub struct MotionClassifier {
    consecutive: u8,
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts changed blocks and evaluates the frame.
    pub fn classify(
        &mut self,
        current: &BlockGrid,
        previous: &BlockGrid,
        mask: &MaskGrid,
        thresholds: &Thresholds,
    ) -> Classification {
        let changed = count_changed_blocks(current, previous, mask, thresholds.block_threshold);
        self.evaluate(changed, thresholds)
    }

    /// Evaluates an already computed changed-block count.
    pub fn evaluate(&mut self, changed: u16, thresholds: &Thresholds) -> Classification {
        let in_band = (thresholds.image_threshold_low..=thresholds.image_threshold_high).contains(&changed);
        if !in_band {
            if self.consecutive > 0 {
                tracing::trace!(changed, run = self.consecutive, "Candidate run broken");
            }
            self.consecutive = 0;
            return Classification::Rejected { changed };
        }

        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= thresholds.consecutive_required.max(1) {
            self.consecutive = 0;
            Classification::Fired { changed }
        } else {
            tracing::debug!(
                changed,
                run = self.consecutive,
                required = thresholds.consecutive_required,
                "Not enough consecutive detections"
            );
            Classification::Candidate {
                changed,
                consecutive: self.consecutive,
            }
        }
    }

    /// Current run of back-to-back candidate frames.
    pub fn consecutive(&self) -> u8 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridGeometry;
    use proptest::prelude::*;

    /// 8×6 blocks, 4×3 mask of 2×2 units: capacity 48.
    fn small_geometry() -> GridGeometry {
        GridGeometry {
            frame_width: 80,
            frame_height: 60,
            block_size: 10,
            mask_columns: 4,
            mask_rows: 3,
        }
    }

    fn thresholds(low: u16, high: u16, consecutive: u8) -> Thresholds {
        Thresholds {
            block_threshold: 7,
            image_threshold_low: low,
            image_threshold_high: high,
            consecutive_required: consecutive,
            ..Thresholds::default()
        }
    }

    /// Grid pair where the first `n` blocks (row-major) changed by 50.
    fn grids_with_changes(n: usize) -> (BlockGrid, BlockGrid) {
        let previous = BlockGrid::new(8, 6);
        let cells = (0..48).map(|i| if i < n { 50 } else { 0 }).collect();
        (BlockGrid::from_cells(8, 6, cells).unwrap(), previous)
    }

    #[test]
    fn test_count_respects_block_threshold() {
        let mask = MaskGrid::all_active(&small_geometry());
        let previous = BlockGrid::new(8, 6);
        let mut current = BlockGrid::new(8, 6);
        current.set(0, 0, 7);
        current.set(1, 0, 8);
        assert_eq!(count_changed_blocks(&current, &previous, &mask, 7), 1);
    }

    #[test]
    fn test_count_skips_masked_blocks() {
        let mut mask = MaskGrid::all_active(&small_geometry());
        mask.set_cell(0, 0, false);
        let (current, previous) = grids_with_changes(48);
        assert_eq!(count_changed_blocks(&current, &previous, &mask, 7), 44);
    }

    #[test]
    fn test_single_required_fires_immediately() {
        let mask = MaskGrid::all_active(&small_geometry());
        let (current, previous) = grids_with_changes(20);
        let mut classifier = MotionClassifier::new();

        let result = classifier.classify(&current, &previous, &mask, &thresholds(15, 192, 1));
        assert_eq!(result, Classification::Fired { changed: 20 });
        assert_eq!(classifier.consecutive(), 0);
    }

    #[test]
    fn test_consecutive_run_reset_by_out_of_band_frame() {
        let t = thresholds(15, 48, 3);
        let mut classifier = MotionClassifier::new();

        assert!(matches!(classifier.evaluate(20, &t), Classification::Candidate { consecutive: 1, .. }));
        assert!(matches!(classifier.evaluate(5, &t), Classification::Rejected { .. }));
        assert_eq!(classifier.consecutive(), 0);
        assert!(matches!(classifier.evaluate(20, &t), Classification::Candidate { consecutive: 1, .. }));
        assert!(matches!(classifier.evaluate(30, &t), Classification::Candidate { consecutive: 2, .. }));
        assert_eq!(classifier.evaluate(25, &t), Classification::Fired { changed: 25 });
    }

    #[test]
    fn test_above_band_discarded_like_below() {
        let t = thresholds(15, 40, 2);
        let mut classifier = MotionClassifier::new();
        classifier.evaluate(20, &t);
        assert_eq!(classifier.evaluate(45, &t), Classification::Rejected { changed: 45 });
        assert_eq!(classifier.consecutive(), 0);
    }

    fn arb_mask_cells() -> impl Strategy<Value = Vec<bool>> {
        proptest::collection::vec(any::<bool>(), 12)
    }

    fn arb_grid() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 48)
    }

    proptest! {
        #[test]
        fn prop_inactive_blocks_never_counted(
            cells in arb_mask_cells(),
            cur in arb_grid(),
            prev in arb_grid(),
            noise in arb_grid(),
            threshold in 1u8..=255,
        ) {
            let mut mask = MaskGrid::all_active(&small_geometry());
            mask.replace(&cells).unwrap();
            let current = BlockGrid::from_cells(8, 6, cur.clone()).unwrap();
            let previous = BlockGrid::from_cells(8, 6, prev).unwrap();
            let base = count_changed_blocks(&current, &previous, &mask, threshold);
            prop_assert!(base <= mask.capacity());

            // Scribbling over masked-out blocks must not change the count.
            let mut scribbled = current.clone();
            for row in 0..6u16 {
                for column in 0..8u16 {
                    if !mask.block_active(column, row) {
                        scribbled.set(column, row, noise[usize::from(row * 8 + column)]);
                    }
                }
            }
            prop_assert_eq!(count_changed_blocks(&scribbled, &previous, &mask, threshold), base);
        }

        #[test]
        fn prop_fires_after_exactly_n_candidates(
            required in 1u8..10,
            counts in proptest::collection::vec(0u16..60, 1..100),
        ) {
            let t = thresholds(15, 48, required);
            let mut classifier = MotionClassifier::new();
            let mut run = 0u8;
            for changed in counts {
                let in_band = (15..=48).contains(&changed);
                let result = classifier.evaluate(changed, &t);
                if in_band {
                    run += 1;
                    prop_assert_eq!(result.fired(), run == required);
                    if run == required {
                        run = 0;
                    }
                } else {
                    run = 0;
                    prop_assert!(!result.fired());
                }
                prop_assert_eq!(classifier.consecutive(), run);
            }
        }
    }
}
