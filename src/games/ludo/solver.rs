use std::collections::HashMap;

use log::{debug, warn};
use rand::Rng;

use super::board::Board;
use super::config::{DiceConfig, Instance, LudoConfig};
use super::rules::RulesEngine;

struct Search<'r> {
    rules: &'r RulesEngine,
    side: usize,
    rolls: &'r [u8],
    memo: HashMap<(Board, usize), Option<usize>>,
}

impl Search<'_> {
    // Fewest turns from `index` on until the side is home, None if the
    // remaining rolls cannot get it there
    fn fewest(&mut self, board: &Board, index: usize) -> Option<usize> {
        if board.side_finished(self.side) {
            return Some(0);
        }
        let roll = *self.rolls.get(index)?;

        let key = (board.clone(), index);
        if let Some(known) = self.memo.get(&key) {
            return *known;
        }

        let legal = self.rules.legal_moves(board, roll, self.side);
        let best = if legal.is_empty() {
            self.fewest(board, index + 1).map(|n| n + 1)
        } else {
            legal
                .into_iter()
                .filter_map(|(token, target)| board.apply(token, target).ok())
                .filter_map(|next| self.fewest(&next, index + 1))
                .min()
                .map(|n| n + 1)
        };

        self.memo.insert(key, best);
        best
    }
}

// Fewest turns the side needs to bring every token home with exactly these
// rolls, playing alone on an otherwise empty board. A turn without any legal
// move still counts.
pub fn min_turns(rules: &RulesEngine, side: usize, rolls: &[u8]) -> Option<usize> {
    let mut search = Search { rules, side, rolls, memo: HashMap::new() };
    search.fewest(&rules.new_board(), 0)
}

// Draw roll sequences until one can be won, giving up after `max_attempts`
pub fn solvable_rolls<R: Rng>(rng: &mut R, rules: &RulesEngine, side: usize, n_rolls: usize, max_attempts: usize) -> Option<(Vec<u8>, usize)> {
    for attempt in 0..max_attempts {
        let rolls: Vec<u8> = (0..n_rolls).map(|_| rng.random_range(1..=6)).collect();
        if let Some(turns) = min_turns(rules, side, &rolls) {
            debug!("Solvable rolls for side {} found after {} attempts", side, attempt + 1);
            return Some((rolls, turns));
        }
    }
    None
}

// Instances with scripted dice for every side. The recorded minimum is the one
// of the agent's side.
pub fn generate_instances<R: Rng>(
    rng: &mut R,
    template: &LudoConfig,
    n_instances: usize,
    n_rolls: usize,
    max_attempts: usize,
) -> Vec<Instance> {
    let rules = RulesEngine::new(template);
    let mut instances = Vec::with_capacity(n_instances);

    for id in 0..n_instances {
        let mut rolls = Vec::with_capacity(template.side_count);
        let mut agent_turns = None;

        for side in 0..template.side_count {
            match solvable_rolls(rng, &rules, side, n_rolls, max_attempts) {
                Some((sequence, turns)) => {
                    if side == 0 {
                        agent_turns = Some(turns);
                    }
                    rolls.push(sequence);
                }
                None => break,
            }
        }

        match agent_turns {
            Some(min_turns) if rolls.len() == template.side_count => instances.push(Instance {
                game_id: format!("{:04}", id),
                config: LudoConfig { dice: DiceConfig::Scripted(rolls), ..template.clone() },
                min_turns,
            }),
            _ => warn!("No solvable rolls for instance {} within {} attempts", id, max_attempts),
        }
    }

    instances
}
