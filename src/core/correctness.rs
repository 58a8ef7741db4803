//! Running estimate of whether the alignment is still tracking the true
//! path.
//!
//! Two-state Viterbi over {correct, false}: a correct alignment accumulates
//! mismatches at roughly the read error rate, a random walk through the
//! graph at roughly 0.75 per base. Each DP block feeds its minimum-score
//! increase in as the block's mismatch count. The tracker exposes the
//! current best state plus which predecessor state each current state came
//! from, which is what the adaptive driver keys its ramp and stop decisions
//! on.

use crate::core::word_slice::{Score, WORD_SIZE};

const CORRECT_MISMATCH_PROBABILITY: f64 = 0.15;
const FALSE_MISMATCH_PROBABILITY: f64 = 0.75;
const CORRECT_TO_FALSE_TRANSITION: f64 = 1e-7;
const FALSE_TO_CORRECT_TRANSITION: f64 = 1e-15;

fn log_binomial(n: usize, k: usize, p: f64) -> f64 {
    debug_assert!(k <= n);
    let mut log_choose = 0.0;
    for i in 0..k {
        log_choose += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
    }
    log_choose + k as f64 * p.ln() + (n - k) as f64 * (1.0 - p).ln()
}

#[derive(Clone, Copy, Debug)]
pub struct AlignmentCorrectnessEstimationState {
    correct_log_odds: f64,
    false_log_odds: f64,
    correct_from_correct: bool,
    false_from_correct: bool,
}

impl Default for AlignmentCorrectnessEstimationState {
    fn default() -> Self {
        AlignmentCorrectnessEstimationState {
            correct_log_odds: 0.8f64.ln(),
            false_log_odds: 0.2f64.ln(),
            correct_from_correct: true,
            false_from_correct: false,
        }
    }
}

impl AlignmentCorrectnessEstimationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is the correct state currently the more likely one?
    pub fn currently_correct(&self) -> bool {
        self.correct_log_odds > self.false_log_odds
    }

    /// Did the correct state's best path stay in the correct state across
    /// the last block? False means the alignment is unrecoverably lost.
    pub fn correct_from_correct(&self) -> bool {
        self.correct_from_correct
    }

    /// Did the false state's best path branch off the correct state at the
    /// last block?
    pub fn false_from_correct(&self) -> bool {
        self.false_from_correct
    }

    /// Advance by one block that added `mismatches` to the minimum score
    /// over `rows` read rows.
    pub fn next_state(&self, mismatches: Score, rows: usize) -> Self {
        debug_assert_eq!(rows, WORD_SIZE);
        debug_assert!(mismatches >= 0);
        let mismatches = (mismatches as usize).min(rows);

        let correct_stay = (1.0 - CORRECT_TO_FALSE_TRANSITION).ln();
        let correct_leave = CORRECT_TO_FALSE_TRANSITION.ln();
        let false_stay = (1.0 - FALSE_TO_CORRECT_TRANSITION).ln();
        let false_leave = FALSE_TO_CORRECT_TRANSITION.ln();

        let correct_from_correct =
            self.correct_log_odds + correct_stay >= self.false_log_odds + false_leave;
        let false_from_correct =
            self.correct_log_odds + correct_leave >= self.false_log_odds + false_stay;

        let correct_base = (self.correct_log_odds + correct_stay)
            .max(self.false_log_odds + false_leave);
        let false_base = (self.correct_log_odds + correct_leave)
            .max(self.false_log_odds + false_stay);

        AlignmentCorrectnessEstimationState {
            correct_log_odds: correct_base
                + log_binomial(rows, mismatches, CORRECT_MISMATCH_PROBABILITY),
            false_log_odds: false_base
                + log_binomial(rows, mismatches, FALSE_MISMATCH_PROBABILITY),
            correct_from_correct,
            false_from_correct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_correct() {
        let state = AlignmentCorrectnessEstimationState::new();
        assert!(state.currently_correct());
        assert!(state.correct_from_correct());
        assert!(!state.false_from_correct());
    }

    #[test]
    fn test_clean_blocks_stay_correct() {
        let mut state = AlignmentCorrectnessEstimationState::new();
        for _ in 0..100 {
            state = state.next_state(2, WORD_SIZE);
            assert!(state.currently_correct());
            assert!(state.correct_from_correct());
        }
    }

    #[test]
    fn test_garbage_blocks_lose_correctness() {
        let mut state = AlignmentCorrectnessEstimationState::new();
        for _ in 0..10 {
            state = state.next_state(3, WORD_SIZE);
        }
        let mut flipped = false;
        for _ in 0..20 {
            state = state.next_state(60, WORD_SIZE);
            if !state.currently_correct() {
                flipped = true;
                break;
            }
        }
        assert!(flipped, "sustained 94% error rate must flip the estimate");
    }

    #[test]
    fn test_midline_error_rates_resolve_by_direction() {
        // well under the crossover: stays correct
        let mut good = AlignmentCorrectnessEstimationState::new();
        for _ in 0..50 {
            good = good.next_state(12, WORD_SIZE);
        }
        assert!(good.currently_correct());
        // well over the crossover: goes false
        let mut bad = AlignmentCorrectnessEstimationState::new();
        for _ in 0..50 {
            bad = bad.next_state(50, WORD_SIZE);
        }
        assert!(!bad.currently_correct());
    }
}
