use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::{DEFAULT_TRACK_LENGTH, MAX_TOKENS_PER_SIDE};
use crate::games::Validate;

// Where the dice values come from. Scripted rolls are listed per side and make
// an episode reproducible across agents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceConfig {
    Seeded(u64),
    Scripted(Vec<Vec<u8>>),
}

impl Default for DiceConfig {
    fn default() -> Self {
        DiceConfig::Seeded(42)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LudoConfig {
    pub track_length: usize,
    pub side_count: usize,
    pub tokens_per_side: usize,
    pub max_reprompts_per_turn: usize,
    // Only change what the agent is told, never the rules
    pub cot_enabled: bool,
    pub board_representation_enabled: bool,
    // Turn cap applied by whoever drives the episode
    pub max_turns: usize,
    pub dice: DiceConfig,
}

impl Default for LudoConfig {
    fn default() -> Self {
        LudoConfig {
            track_length: DEFAULT_TRACK_LENGTH,
            side_count: 1,
            tokens_per_side: 2,
            max_reprompts_per_turn: 2,
            cot_enabled: false,
            board_representation_enabled: true,
            max_turns: 50,
            dice: DiceConfig::default(),
        }
    }
}

impl LudoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open config {}", path.display()))?;
        let config: LudoConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_multiplayer(&self) -> bool {
        self.side_count > 1
    }
}

impl Validate for LudoConfig {
    fn validate(&self) -> Result<()> {
        if self.track_length < 2 {
            return Err(anyhow!("Track length ({}) has to be at least 2", self.track_length));
        }
        if self.side_count < 1 || self.side_count > 2 {
            return Err(anyhow!("Number of sides ({}) outside the bound [1, 2]", self.side_count));
        }
        if self.tokens_per_side < 1 || self.tokens_per_side > MAX_TOKENS_PER_SIDE {
            return Err(anyhow!(
                "Tokens per side ({}) outside the bound [1, {}]",
                self.tokens_per_side,
                MAX_TOKENS_PER_SIDE
            ));
        }

        if let DiceConfig::Scripted(rolls) = &self.dice {
            if rolls.len() != self.side_count {
                return Err(anyhow!("Scripted dice list {} sequences for {} sides", rolls.len(), self.side_count));
            }
            if let Some(roll) = rolls.iter().flatten().find(|r| !(1..=6).contains(*r)) {
                return Err(anyhow!("Scripted roll {} is not a die value", roll));
            }
        }

        Ok(())
    }
}

// One generated game: configuration with scripted dice and the fewest turns the
// agent needs to bring every token home with those rolls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    pub game_id: String,
    pub config: LudoConfig,
    pub min_turns: usize,
}

pub fn load_instances(path: &Path) -> Result<Vec<Instance>> {
    let file = File::open(path).with_context(|| format!("Failed to open instances {}", path.display()))?;
    let instances: Vec<Instance> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse instances {}", path.display()))?;

    for instance in &instances {
        instance
            .config
            .validate()
            .with_context(|| format!("Invalid instance {}", instance.game_id))?;
    }

    Ok(instances)
}
