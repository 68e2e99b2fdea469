use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use games::ludo::config::load_instances;
use games::ludo::prompt::{Conversation, Message};
use games::ludo::players::{NoisyPlayer, ProgrammaticPlayer, RandomPlayer, ScriptedPlayer};
use games::ludo::record::{JsonlRecorder, NullRecorder, PlayLog, SharedLog};
use games::ludo::solver::generate_instances;
use games::ludo::{DiceConfig, Episode, EpisodeState, EpisodeSummary, LudoConfig, Recorder, Responder, RulesEngine};
use games::{GameState, Validate};
use tui::{Ending, TerminalPlayer};

mod games;
mod tui;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

// Built-in stand-ins for the agent under evaluation
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Agent {
    Programmatic,
    Random,
    Noisy,
    /// Recorded answers from a file, the same ones for every episode
    Replay,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// JSON file with a game configuration, defaults are used for missing keys
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    sides: Option<usize>,
    #[arg(long)]
    tokens: Option<usize>,
    #[arg(long)]
    track_length: Option<usize>,
    #[arg(long)]
    max_reprompts: Option<usize>,
    #[arg(long)]
    max_turns: Option<usize>,
    /// Ask for step by step reasoning before the move
    #[arg(long)]
    cot: bool,
    /// Leave the board out of the turn prompts
    #[arg(long)]
    no_board: bool,
}

impl ConfigArgs {
    // Flags that only change how the agent is asked, safe for stored instances
    fn apply_prompting(&self, config: &mut LudoConfig) {
        if let Some(max_reprompts) = self.max_reprompts {
            config.max_reprompts_per_turn = max_reprompts;
        }
        if let Some(max_turns) = self.max_turns {
            config.max_turns = max_turns;
        }
        config.cot_enabled |= self.cot;
        config.board_representation_enabled &= !self.no_board;
    }

    fn resolve(&self) -> Result<LudoConfig> {
        let mut config = match &self.config {
            Some(path) => LudoConfig::load(path)?,
            None => LudoConfig::default(),
        };

        if let Some(sides) = self.sides {
            config.side_count = sides;
        }
        if let Some(tokens) = self.tokens {
            config.tokens_per_side = tokens;
        }
        if let Some(track_length) = self.track_length {
            config.track_length = track_length;
        }
        self.apply_prompting(&mut config);

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    Simulate {
        #[arg(short)]
        log_file: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
        /// Play stored instances instead of freshly seeded games
        #[arg(short, long)]
        instances: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 100)]
        episodes: usize,
        #[arg(long, value_enum, default_value_t = Agent::Noisy)]
        agent: Agent,
        #[arg(long, default_value_t = 0.2)]
        error_rate: f64,
        /// Write the agent's conversation of every episode here
        #[arg(long)]
        transcripts: Option<PathBuf>,
        /// JSON list of answers for the replay agent, null for a missing answer
        #[arg(long, required_if_eq("agent", "replay"))]
        responses: Option<PathBuf>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    Generate {
        #[arg(short)]
        output: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(short = 'n', long, default_value_t = 10)]
        n_instances: usize,
        #[arg(long, default_value_t = 50)]
        n_rolls: usize,
        #[arg(long, default_value_t = 1000)]
        max_attempts: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    Interactive {
        #[command(flatten)]
        config: ConfigArgs,
        /// Write the turn records of the session here
        #[arg(short)]
        log_file: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

// What the driver keeps of a finished episode
struct EpisodeResult {
    game_id: String,
    state: EpisodeState,
    winner: Option<usize>,
    summary: EpisodeSummary,
    min_turns: Option<usize>,
    transcript: Conversation,
}

// One line of the transcript file
#[derive(serde::Serialize)]
struct TranscriptLine<'a> {
    game_id: &'a str,
    messages: &'a [Message],
}

fn write_transcripts(results: &[EpisodeResult], file: &Path) -> Result<()> {
    let file = File::create(file).with_context(|| format!("Failed to create {}", file.display()))?;
    let mut writer = BufWriter::new(file);
    for result in results {
        let line = TranscriptLine { game_id: &result.game_id, messages: result.transcript.messages() };
        jsonl::write(&mut writer, &line)?;
    }
    Ok(())
}

fn write_play_log(play_log: &PlayLog, file: &Path) -> Result<()> {
    let file = File::create(file).with_context(|| format!("Failed to create {}", file.display()))?;
    let mut writer = BufWriter::new(file);
    for item in play_log {
        jsonl::write(&mut writer, item)?;
    }
    Ok(())
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn report(results: &[EpisodeResult], n_sides: usize) {
    let total = results.len();
    let count = |state: EpisodeState| results.iter().filter(|r| r.state == state).count();
    let completed = count(EpisodeState::Completed);
    let aborted = count(EpisodeState::Aborted);
    let turn_limit = count(EpisodeState::InProgress);

    println!("Completed: {}/{}, ratio: {}", completed, total, ratio(completed, total));
    println!("Aborted: {}/{}, ratio: {}", aborted, total, ratio(aborted, total));
    println!("Turn limit reached: {}/{}, ratio: {}", turn_limit, total, ratio(turn_limit, total));

    let mut win_counts: HashMap<usize, usize> = HashMap::from_iter((0..n_sides).map(|i| (i, 0)));
    for winner in results.iter().filter_map(|r| r.winner) {
        *win_counts.entry(winner).or_default() += 1;
    }
    for i in 0..n_sides {
        println!("Win Count for S{}: {}/{}, ratio: {}", i, win_counts[&i], total, ratio(win_counts[&i], total));
    }

    let answers: usize = results
        .iter()
        .map(|r| r.summary.accepted_moves + r.summary.skipped_turns + r.summary.errors())
        .sum();
    let parse_errors: usize = results.iter().map(|r| r.summary.parse_errors).sum();
    let rule_errors: usize = results.iter().map(|r| r.summary.rule_errors).sum();
    let external_errors: usize = results.iter().map(|r| r.summary.external_errors).sum();
    let reprompts: usize = results.iter().map(|r| r.summary.reprompts).sum();

    println!("Answers: {}, reprompts: {}", answers, reprompts);
    println!("Parse errors: {}, ratio: {}", parse_errors, ratio(parse_errors, answers));
    println!("Rule errors: {}, ratio: {}", rule_errors, ratio(rule_errors, answers));
    println!("External errors: {}", external_errors);

    // Only stored instances know how fast they can be won
    let optimal = results
        .iter()
        .filter(|r| r.state == EpisodeState::Completed && r.winner == Some(0))
        .filter(|r| r.min_turns.is_some_and(|best| r.summary.turns_played <= best))
        .count();
    if results.iter().any(|r| r.min_turns.is_some()) {
        println!("Won in the fewest possible turns: {}/{}", optimal, total);
    }
}

// Settings for the stand-in agent, shared by all episodes
struct AgentSetup {
    agent: Agent,
    error_rate: f64,
    seed: u64,
    responses: Vec<Option<String>>,
}

impl AgentSetup {
    fn player(&self, rules: RulesEngine, episode_idx: usize) -> Box<dyn Responder> {
        let seed = self.seed.wrapping_add(episode_idx as u64);
        match self.agent {
            Agent::Programmatic => Box::new(ProgrammaticPlayer::new(rules)),
            Agent::Random => Box::new(RandomPlayer::new(rules, seed)),
            Agent::Noisy => Box::new(NoisyPlayer::new(rules, seed, self.error_rate)),
            Agent::Replay => Box::new(ScriptedPlayer::new(self.responses.clone())),
        }
    }
}

fn load_responses(path: &Path) -> Result<Vec<Option<String>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let responses = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(responses)
}

fn simulate(
    log_file: &Path,
    transcripts: Option<&Path>,
    config_args: &ConfigArgs,
    instances: Option<&Path>,
    n_episodes: usize,
    setup: &AgentSetup,
) -> Result<()> {
    // (game id, configuration, fewest turns if known)
    let games: Vec<(String, LudoConfig, Option<usize>)> = match instances {
        Some(path) => load_instances(path)?
            .into_iter()
            .map(|instance| {
                let mut config = instance.config;
                config_args.apply_prompting(&mut config);
                (instance.game_id, config, Some(instance.min_turns))
            })
            .collect(),
        None => {
            let config = config_args.resolve()?;
            (0..n_episodes)
                .map(|idx| {
                    let mut config = config.clone();
                    if let DiceConfig::Seeded(base) = config.dice {
                        config.dice = DiceConfig::Seeded(base.wrapping_add(idx as u64));
                    }
                    (format!("{:04}", idx), config, None)
                })
                .collect()
        }
    };

    let n_sides = games.iter().map(|(_, config, _)| config.side_count).max().unwrap_or(1);
    log::info!("Running {} episodes with the {:?} agent", games.len(), setup.agent);

    let play_log: Arc<Mutex<PlayLog>> = Arc::new(Mutex::new(Vec::new()));

    let results: Vec<EpisodeResult> = games
        .into_par_iter()
        .enumerate()
        .map(|(idx, (game_id, config, min_turns))| -> Result<EpisodeResult> {
            let rules = RulesEngine::new(&config);
            let mut players = vec![setup.player(rules, idx)];
            if config.is_multiplayer() {
                players.push(Box::new(ProgrammaticPlayer::new(rules)));
            }

            let mut episode = Episode::new(config, players).with_context(|| format!("Invalid game {}", game_id))?;
            let mut recorder = SharedLog { game_id: game_id.clone(), log: play_log.clone() };
            let state = episode.play(&mut recorder)?;

            episode.board().validate()?;
            log::info!(
                "Game {} with {} ended {:?} after {} turns and {} answers",
                game_id,
                episode.player_name(0),
                state,
                episode.turn(),
                episode.turns().len()
            );
            if episode.board().is_game_over() {
                log::debug!("Winner of {} is S{:?}", game_id, episode.winner());
            }

            Ok(EpisodeResult {
                game_id,
                state,
                winner: episode.winner(),
                summary: episode.summary(),
                min_turns,
                transcript: episode.conversation(0).clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for result in results.iter().filter(|r| r.state == EpisodeState::Aborted) {
        log::debug!("Game {} aborted", result.game_id);
    }

    report(&results, n_sides);
    if let Some(path) = transcripts {
        write_transcripts(&results, path)?;
    }
    let play_log = play_log.lock().map_err(|_| anyhow!("Play log lock poisoned"))?;
    write_play_log(&play_log, log_file)
}

fn generate(output: &Path, config_args: &ConfigArgs, n_instances: usize, n_rolls: usize, max_attempts: usize, seed: u64) -> Result<()> {
    let template = config_args.resolve()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let instances = generate_instances(&mut rng, &template, n_instances, n_rolls, max_attempts);
    log::info!("Generated {}/{} instances", instances.len(), n_instances);

    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &instances)?;
    Ok(())
}

fn play_interactive(human: &mut TerminalPlayer, config: LudoConfig, log_file: Option<&Path>) -> Result<()> {
    let rules = RulesEngine::new(&config);
    let mut players: Vec<Box<dyn Responder + '_>> = vec![Box::new(&mut *human)];
    if config.is_multiplayer() {
        players.push(Box::new(ProgrammaticPlayer::new(rules)));
    }

    let mut recorder: Box<dyn Recorder> = match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(JsonlRecorder::new("interactive", BufWriter::new(file)))
        }
        None => Box::new(NullRecorder),
    };

    let mut episode = Episode::new(config, players)?;
    let state = episode.play(recorder.as_mut())?;
    let board = episode.board().clone();
    let ending = Ending { state, winner: episode.winner(), summary: episode.summary() };
    drop(episode);

    // Listen to Q unless user has showed intention to quit already
    if !human.has_quit() {
        human.show_ending(board, ending)?;
    }
    Ok(())
}

fn run_interactive(config_args: &ConfigArgs, log_file: Option<&Path>, seed: Option<u64>) -> Result<()> {
    let mut config = config_args.resolve()?;
    if let Some(seed) = seed {
        config.dice = DiceConfig::Seeded(seed);
    }

    color_eyre::install().map_err(|err| anyhow!("{}", err))?;
    let terminal = ratatui::init();
    let mut human = TerminalPlayer::new(terminal, RulesEngine::new(&config));

    let result = play_interactive(&mut human, config, log_file);
    ratatui::restore();
    result
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.commands {
        Commands::Simulate { log_file, config, instances, episodes, agent, error_rate, transcripts, responses, seed } => {
            let responses = match responses {
                Some(path) => load_responses(&path)?,
                None => Vec::new(),
            };
            let setup = AgentSetup { agent, error_rate, seed, responses };
            simulate(&log_file, transcripts.as_deref(), &config, instances.as_deref(), episodes, &setup)
        }
        Commands::Generate { output, config, n_instances, n_rolls, max_attempts, seed } => {
            generate(&output, &config, n_instances, n_rolls, max_attempts, seed)
        }
        Commands::Interactive { config, log_file, seed } => run_interactive(&config, log_file.as_deref(), seed),
    }
}
