//! Plinko board animation model. Cosmetic only: it reads drop results and
//! never writes financial state.
//!
//! The landing slot always comes from the actual result (payout / wager
//! mapped to the nearest slot multiplier). Only the route through the pegs
//! is random.

use alloy::primitives::U256;
use rand::{
    Rng,
    seq::SliceRandom,
};

use crate::session::DropResult;

pub const PEG_ROWS: usize = 10;
pub const SLOT_COUNT: usize = PEG_ROWS + 1;

/// Slot multipliers in basis points, left to right.
pub const SLOT_MULTIPLIERS_BPS: [u64; SLOT_COUNT] = [
    0, 5_000, 8_000, 10_000, 12_000, 15_000, 20_000, 25_000, 30_000, 40_000, 50_000,
];

const BPS: u64 = 10_000;

pub fn slot_label(slot: usize) -> String {
    let bps = SLOT_MULTIPLIERS_BPS[slot.min(SLOT_COUNT - 1)];
    let whole = bps / BPS;
    let tenths = (bps % BPS) / 1_000;
    if tenths == 0 {
        format!("{whole}x")
    } else {
        format!("{whole}.{tenths}x")
    }
}

/// Slot whose multiplier is nearest `payout / wager`; ties go left.
pub fn slot_for_result(wager: U256, payout: U256) -> usize {
    if wager.is_zero() {
        return 0;
    }
    let ratio = payout.saturating_mul(U256::from(BPS)) / wager;
    let ratio = u64::try_from(ratio).unwrap_or(u64::MAX);
    SLOT_MULTIPLIERS_BPS
        .iter()
        .enumerate()
        .min_by_key(|(_, bps)| bps.abs_diff(ratio))
        .map(|(slot, _)| slot)
        .unwrap_or(0)
}

/// Column of the ball after each peg row. Each row moves it zero or one
/// column right, so after the last row the column is the slot index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BallPath {
    columns: Vec<usize>,
}

impl BallPath {
    pub fn toward<R: Rng + ?Sized>(slot: usize, rng: &mut R) -> Self {
        let slot = slot.min(PEG_ROWS);
        let mut moves: Vec<bool> = (0..PEG_ROWS).map(|row| row < slot).collect();
        moves.shuffle(rng);
        let columns = moves
            .iter()
            .scan(0usize, |column, right| {
                *column += usize::from(*right);
                Some(*column)
            })
            .collect();
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_at(&self, row: usize) -> Option<usize> {
        self.columns.get(row).copied()
    }

    pub fn landing_slot(&self) -> usize {
        self.columns.last().copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardPhase {
    Idle,
    /// Transaction pending; the ball wobbles at the top.
    Waiting { wager: U256, frame: usize },
    Falling { path: BallPath, row: usize, result: DropResult },
    Landed { slot: usize, result: DropResult },
}

/// Emitted by [`Board::tick`] when the ball reaches its slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Landing {
    pub slot: usize,
    pub result: DropResult,
}

#[derive(Clone, Debug)]
pub struct Board {
    phase: BoardPhase,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            phase: BoardPhase::Idle,
        }
    }
}

impl Board {
    pub fn phase(&self) -> &BoardPhase {
        &self.phase
    }

    pub fn drop_requested(&mut self, wager: U256) {
        self.phase = BoardPhase::Waiting { wager, frame: 0 };
    }

    pub fn drop_resolved<R: Rng + ?Sized>(&mut self, result: &DropResult, rng: &mut R) {
        let slot = slot_for_result(result.wager, result.payout);
        self.phase = BoardPhase::Falling {
            path: BallPath::toward(slot, rng),
            row: 0,
            result: result.clone(),
        };
    }

    pub fn drop_failed(&mut self) {
        self.phase = BoardPhase::Idle;
    }

    pub fn is_animating(&self) -> bool {
        matches!(
            self.phase,
            BoardPhase::Waiting { .. } | BoardPhase::Falling { .. }
        )
    }

    pub fn tick(&mut self) -> Option<Landing> {
        match &mut self.phase {
            BoardPhase::Waiting { frame, .. } => {
                *frame = frame.wrapping_add(1);
                None
            }
            BoardPhase::Falling { path, row, result } => {
                if *row + 1 < path.len() {
                    *row += 1;
                    return None;
                }
                let landing = Landing {
                    slot: path.landing_slot(),
                    result: result.clone(),
                };
                self.phase = BoardPhase::Landed {
                    slot: landing.slot,
                    result: landing.result.clone(),
                };
                Some(landing)
            }
            BoardPhase::Idle | BoardPhase::Landed { .. } => None,
        }
    }

    /// `(row, column)` of the ball while it is on the board.
    pub fn ball_position(&self) -> Option<(usize, usize)> {
        match &self.phase {
            BoardPhase::Falling { path, row, .. } => {
                path.column_at(*row).map(|column| (*row, column))
            }
            _ => None,
        }
    }

    pub fn highlighted_slot(&self) -> Option<usize> {
        match &self.phase {
            BoardPhase::Landed { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::primitives::B256;
    use generated_abi::test_helpers::ether;
    use proptest::prelude::*;
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    fn result(wager: &str, payout: &str) -> DropResult {
        DropResult {
            wager: ether(wager),
            multiplier: U256::ZERO,
            payout: ether(payout),
            tickets_awarded: 0,
            tx_hash: B256::ZERO,
        }
    }

    #[test]
    fn slot_for_result__picks_nearest_multiplier() {
        assert_eq!(slot_for_result(ether("0.001"), ether("0.002")), 6);
        assert_eq!(slot_for_result(ether("1"), U256::ZERO), 0);
        assert_eq!(slot_for_result(ether("1"), ether("1.1")), 3);
        assert_eq!(slot_for_result(ether("1"), ether("9")), 10);
    }

    #[test]
    fn slot_for_result__zero_wager_lands_left() {
        assert_eq!(slot_for_result(U256::ZERO, ether("1")), 0);
    }

    #[test]
    fn slot_label__formats_fractional_multipliers() {
        assert_eq!(slot_label(0), "0x");
        assert_eq!(slot_label(1), "0.5x");
        assert_eq!(slot_label(7), "2.5x");
    }

    #[test]
    fn tick__lands_in_result_slot_after_all_rows() {
        // given
        let mut board = Board::default();
        let mut rng = StdRng::seed_from_u64(7);
        board.drop_requested(ether("0.001"));
        board.drop_resolved(&result("0.001", "0.002"), &mut rng);

        // when
        let mut landings = Vec::new();
        for _ in 0..PEG_ROWS {
            landings.extend(board.tick());
        }

        // then
        assert_eq!(landings.len(), 1);
        assert_eq!(landings[0].slot, 6);
        assert_eq!(board.highlighted_slot(), Some(6));
        assert!(!board.is_animating());
    }

    #[test]
    fn drop_failed__returns_board_to_idle() {
        let mut board = Board::default();
        board.drop_requested(ether("1"));

        board.drop_failed();

        assert_eq!(board.phase(), &BoardPhase::Idle);
    }

    proptest! {
        #[test]
        fn toward__path_ends_at_slot_moving_at_most_one_column(
            slot in 0usize..SLOT_COUNT,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let path = BallPath::toward(slot, &mut rng);

            prop_assert_eq!(path.len(), PEG_ROWS);
            prop_assert_eq!(path.landing_slot(), slot);
            let mut previous = 0;
            for row in 0..path.len() {
                let column = path.column_at(row).unwrap();
                prop_assert!(column == previous || column == previous + 1);
                previous = column;
            }
        }
    }
}
