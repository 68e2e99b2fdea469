use anyhow::Result;

pub mod ludo;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

// A game state for sequential games with n sides taking plys in turn. Ludo has
// no rounds, a game is over as soon as one side has brought every token home.
pub trait GameState {
    // Tell which side has won, if any.
    fn winner(&self) -> Option<usize>;

    fn is_game_over(&self) -> bool {
        self.winner().is_some()
    }
}
