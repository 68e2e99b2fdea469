use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::config::DiceConfig;

// Roll source for one side. Never re-rolled within a turn.
#[derive(Clone, Debug)]
pub enum Dice {
    Scripted { rolls: Vec<u8>, next: usize },
    Seeded(ChaCha8Rng),
}

impl Dice {
    pub fn scripted(rolls: Vec<u8>) -> Self {
        Dice::Scripted { rolls, next: 0 }
    }

    pub fn seeded(seed: u64) -> Self {
        Dice::Seeded(ChaCha8Rng::seed_from_u64(seed))
    }

    // One dice per side. Seeded sides get distinct streams derived from the seed.
    pub fn for_sides(config: &DiceConfig, side_count: usize) -> Vec<Dice> {
        match config {
            DiceConfig::Seeded(seed) => (0..side_count)
                .map(|side| Dice::seeded(seed.wrapping_add((side as u64).wrapping_mul(0x9E3779B97F4A7C15))))
                .collect(),
            DiceConfig::Scripted(rolls) => rolls.iter().take(side_count).cloned().map(Dice::scripted).collect(),
        }
    }

    // Next roll, or None once a script has run out
    pub fn roll(&mut self) -> Option<u8> {
        match self {
            Dice::Scripted { rolls, next } => {
                let roll = rolls.get(*next).copied()?;
                *next += 1;
                Some(roll)
            }
            Dice::Seeded(rng) => Some(rng.random_range(1..=6)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_runs_out() {
        let mut dice = Dice::scripted(vec![6, 2]);
        assert_eq!(dice.roll(), Some(6));
        assert_eq!(dice.roll(), Some(2));
        assert_eq!(dice.roll(), None);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = Dice::seeded(7);
        let mut b = Dice::seeded(7);
        let seq_a: Vec<u8> = (0..50).filter_map(|_| a.roll()).collect();
        let seq_b: Vec<u8> = (0..50).filter_map(|_| b.roll()).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().all(|r| (1..=6).contains(r)));
    }

    #[test]
    fn test_sides_get_distinct_streams() {
        let mut dice = Dice::for_sides(&DiceConfig::Seeded(1), 2);
        let first: Vec<u8> = (0..30).filter_map(|_| dice[0].roll()).collect();
        let second: Vec<u8> = (0..30).filter_map(|_| dice[1].roll()).collect();
        assert_ne!(first, second);
    }
}
