use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RewardTier {
    pub amount: u64,
    pub weight: u32,
}

#[derive(Error, Debug)]
pub enum RewardConfigError {
    #[error("reward table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reward table is empty")]
    Empty,

    #[error("reward tier {index} has a zero amount")]
    ZeroAmount { index: usize },

    #[error("reward tier {index} has a zero weight")]
    ZeroWeight { index: usize },
}

/// Daily check-in rewards, drawn with probability proportional to weight.
#[derive(Debug, Clone)]
pub struct RewardTable {
    tiers: Vec<RewardTier>,
    total_weight: u64,
}

impl RewardTable {
    pub fn new(tiers: Vec<RewardTier>) -> Result<Self, RewardConfigError> {
        if tiers.is_empty() {
            return Err(RewardConfigError::Empty);
        }
        for (index, tier) in tiers.iter().enumerate() {
            if tier.amount == 0 {
                return Err(RewardConfigError::ZeroAmount { index });
            }
            if tier.weight == 0 {
                return Err(RewardConfigError::ZeroWeight { index });
            }
        }

        let total_weight = tiers.iter().map(|tier| u64::from(tier.weight)).sum();
        Ok(Self {
            tiers,
            total_weight,
        })
    }

    /// Parses `[{"amount": 10, "weight": 70}, ...]`.
    pub fn from_json(text: &str) -> Result<Self, RewardConfigError> {
        let tiers: Vec<RewardTier> = serde_json::from_str(text)?;
        Self::new(tiers)
    }

    pub fn tiers(&self) -> &[RewardTier] {
        &self.tiers
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let roll = rng.gen_range(0..self.total_weight);

        let mut cumulative = 0u64;
        for tier in &self.tiers {
            cumulative += u64::from(tier.weight);
            if roll < cumulative {
                return tier.amount;
            }
        }

        // roll < total_weight, so the scan always returns above
        self.tiers[self.tiers.len() - 1].amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashMap;

    #[test]
    fn parses_and_validates_config() {
        let table = RewardTable::from_json(r#"[{"amount":5,"weight":3},{"amount":50,"weight":1}]"#)
            .unwrap();
        assert_eq!(table.tiers().len(), 2);

        assert!(matches!(RewardTable::from_json("[]"), Err(RewardConfigError::Empty)));
        assert!(matches!(
            RewardTable::from_json(r#"[{"amount":0,"weight":1}]"#),
            Err(RewardConfigError::ZeroAmount { index: 0 })
        ));
        assert!(matches!(
            RewardTable::from_json(r#"[{"amount":1,"weight":1},{"amount":2,"weight":0}]"#),
            Err(RewardConfigError::ZeroWeight { index: 1 })
        ));
        assert!(matches!(
            RewardTable::from_json(r#"[{"amount":1}]"#),
            Err(RewardConfigError::Json(_))
        ));
        assert!(matches!(
            RewardTable::from_json(r#"[{"amount":-1,"weight":1}]"#),
            Err(RewardConfigError::Json(_))
        ));
    }

    #[test]
    fn single_tier_always_wins() {
        let table = RewardTable::new(vec![RewardTier {
            amount: 7,
            weight: 1,
        }])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..100).all(|_| table.draw(&mut rng) == 7));
    }

    #[test]
    fn draw_frequencies_follow_weights() {
        let table = RewardTable::new(vec![
            RewardTier { amount: 1, weight: 60 },
            RewardTier { amount: 10, weight: 30 },
            RewardTier { amount: 100, weight: 10 },
        ])
        .unwrap();

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let trials = 100_000;
        let mut counts: HashMap<u64, u32> = HashMap::new();
        for _ in 0..trials {
            *counts.entry(table.draw(&mut rng)).or_default() += 1;
        }

        for tier in table.tiers() {
            let expected = f64::from(tier.weight) / 100.0;
            let observed = f64::from(counts[&tier.amount]) / f64::from(trials);
            assert!(
                (observed - expected).abs() < 0.01,
                "amount {} drawn {:.4}, expected {:.4}",
                tier.amount,
                observed,
                expected
            );
        }
    }
}
