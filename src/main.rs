use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cli_chess::board::{BoardModel, GameStatus, Orientation};
use cli_chess::config::{ComputerOptions, GameOptions, Variant};
use cli_chess::game::{ComputerMove, GameEvent, GameManager, GameSession, NoMoveReason, StaleReason};
use cli_chess::{Error, Result};
use log::debug;
use shakmaty::Color;
use tokio::io::{AsyncBufReadExt, BufReader};

const GAME_ID: &str = "local";

#[derive(Parser, Debug)]
#[command(author, version, about = "Play chess in the terminal against a UCI engine", long_about = None)]
struct Args {
    /// Path to a UCI engine binary. Without one you play both sides
    #[arg(long)]
    engine: Option<PathBuf>,

    /// JSON file with game options. Flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Computer difficulty from 1 to 8
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    level: Option<u8>,

    /// Play at a fixed rating instead of a level
    #[arg(long)]
    elo: Option<u32>,

    /// Your color: 'w' for white, 'b' for black
    #[arg(long)]
    color: Option<String>,

    /// Starting FEN position
    #[arg(long)]
    fen: Option<String>,

    /// Game variant: standard, chess960, atomic, crazyhouse, kingofthehill,
    /// 3check, antichess, horde or racingkings
    #[arg(long)]
    variant: Option<Variant>,

    /// Computer think time per move in milliseconds
    #[arg(long)]
    think_ms: Option<u32>,
}

enum Input {
    Move(String),
    Takeback,
    Resign,
    Flip,
    Moves,
    Fen,
    Logs,
    Help,
    Quit,
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        let input = match line.trim() {
            "" => return None,
            "undo" | "takeback" => Input::Takeback,
            "resign" => Input::Resign,
            "flip" => Input::Flip,
            "moves" => Input::Moves,
            "fen" => Input::Fen,
            "logs" => Input::Logs,
            "help" | "?" => Input::Help,
            "quit" | "exit" => Input::Quit,
            mv => Input::Move(mv.to_string()),
        };
        Some(input)
    }
}

fn parse_color(color: &str) -> Result<Color> {
    match color.to_lowercase().as_str() {
        "w" | "white" => Ok(Color::White),
        "b" | "black" => Ok(Color::Black),
        _ => Err(Error::Config("invalid color: use 'w' or 'b'".to_string())),
    }
}

fn build_options(args: &Args) -> Result<GameOptions> {
    let mut options = match &args.config {
        Some(path) => GameOptions::from_file(path)?,
        None => GameOptions::default(),
    };

    if let Some(color) = &args.color {
        options.orientation = Orientation::from(parse_color(color)?);
    }
    if let Some(fen) = &args.fen {
        options.fen = Some(fen.clone());
    }
    if let Some(variant) = args.variant {
        options.variant = variant;
    }

    if let Some(engine) = &args.engine {
        options
            .computer
            .get_or_insert_with(ComputerOptions::default)
            .engine_path = engine.clone();
    }
    let wants_computer = args.level.is_some() || args.elo.is_some() || args.think_ms.is_some();
    match options.computer.as_mut() {
        Some(computer) => {
            if args.level.is_some() {
                computer.skill_level = args.level;
            }
            if args.elo.is_some() {
                computer.elo = args.elo;
            }
            if let Some(think_ms) = args.think_ms {
                computer.think_time_ms = think_ms;
            }
        }
        None if wants_computer => {
            return Err(Error::Config("computer settings need an engine (--engine)".to_string()));
        }
        None => {}
    }

    debug!("Game options: {:?}", options);
    Ok(options)
}

fn print_board(board: &BoardModel) {
    let mut out = String::new();
    for (index, square) in board.enumerate_squares().into_iter().enumerate() {
        if let Some(label) = board.rank_label_for(square) {
            out.push(label);
            out.push(' ');
        }
        out.push(board.piece_at(square).map_or('.', |piece| piece.char()));
        out.push(if board.square_in_check(square) { '+' } else { ' ' });
        if index % 8 == 7 {
            out.push('\n');
        }
    }
    out.push_str("  ");
    for label in board.file_labels() {
        out.push(label);
        out.push(' ');
    }
    println!("\n{}", out.trim_end());
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

fn describe_status(status: GameStatus) -> String {
    match status {
        GameStatus::Ongoing => "Game in progress".to_string(),
        GameStatus::Checkmate { winner } => format!("Checkmate! {} wins!", color_name(winner)),
        GameStatus::Stalemate => "Game is a stalemate!".to_string(),
        GameStatus::InsufficientMaterial => "Draw by insufficient material".to_string(),
        GameStatus::SeventyFiveMoves => "Draw by the seventy-five move rule".to_string(),
        GameStatus::FivefoldRepetition => "Draw by fivefold repetition".to_string(),
        GameStatus::VariantWin { winner } => format!("{} wins by the variant rules!", color_name(winner)),
        GameStatus::VariantDraw => "Draw by the variant rules".to_string(),
        GameStatus::Resigned { winner } => {
            format!("{} resigns! {} wins!", color_name(!winner), color_name(winner))
        }
        GameStatus::Aborted => "Game aborted".to_string(),
    }
}

fn print_help() {
    println!("Enter moves as SAN (Nf3) or UCI (g1f3).");
    println!("Commands: takeback, resign, flip, moves, fen, logs, help, quit");
}

fn prompt(game: &GameSession) -> Result<()> {
    print!("{} to move> ", color_name(game.board().turn()));
    io::stdout().flush()?;
    Ok(())
}

/// Returns false when the computer cannot continue.
fn report_computer_move(result: ComputerMove) -> bool {
    match result {
        ComputerMove::Applied(mv) => {
            println!("Computer plays {}", mv.san);
            true
        }
        ComputerMove::Discarded(StaleReason::HistoryChanged) => true,
        ComputerMove::Discarded(StaleReason::GameOver(_)) => true,
        ComputerMove::NoMove(NoMoveReason::EngineFailed(e)) => {
            println!("The engine stopped working: {e}");
            false
        }
        ComputerMove::NoMove(reason) => {
            println!("Computer made no move ({reason:?})");
            false
        }
    }
}

fn handle_input(game: &GameSession, input: Input, thinking: bool) -> bool {
    match input {
        Input::Move(text) => {
            if thinking || game.is_computer_turn() {
                println!("Wait for the computer to move.");
            } else if let Err(e) = game.submit_move(&text) {
                println!("{e}");
            }
        }
        Input::Takeback => {
            if game.takeback().is_empty() {
                println!("Nothing to take back.");
            }
        }
        Input::Resign => {
            game.resign();
        }
        Input::Flip => game.flip_board(),
        Input::Moves => println!("{}", game.board().san_history().join(" ")),
        Input::Fen => println!("{}", game.board().fen()),
        Input::Logs => match game.engine() {
            Some(engine) => match serde_json::to_string_pretty(&engine.logs()) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("Could not format engine logs: {e}"),
            },
            None => println!("No engine in this game."),
        },
        Input::Help => print_help(),
        Input::Quit => return false,
    }
    true
}

async fn run(args: Args) -> Result<()> {
    let options = build_options(&args)?;
    let manager = GameManager::new();
    let (game, mut events) = manager.start_game(GAME_ID, &options).await?;
    if let Some(engine) = game.engine() {
        println!("Playing against {}", engine.info().name);
    }
    print_help();

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut thinking = false;
    let mut redraw = true;

    loop {
        if !thinking {
            let status = game.status();
            if redraw {
                print_board(&game.board());
            }
            if !status.is_ongoing() {
                println!("\n{}", describe_status(status));
                break;
            }
            if game.is_computer_turn() {
                println!("Computer is thinking...");
                game.spawn_computer_turn();
                thinking = true;
            } else {
                prompt(&game)?;
            }
        }
        redraw = true;

        tokio::select! {
            event = events.recv() => match event {
                Some(GameEvent::ComputerMove(result)) => {
                    thinking = false;
                    if !report_computer_move(result) {
                        break;
                    }
                }
                Some(GameEvent::ComputerError(e)) => {
                    manager.end_all().await;
                    return Err(e);
                }
                None => break,
            },
            line = input.next_line() => {
                let Some(line) = line? else { break };
                match Input::parse(&line) {
                    Some(command) => {
                        if !handle_input(&game, command, thinking) {
                            break;
                        }
                    }
                    None => redraw = false,
                }
            }
        }
    }

    manager.end_all().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
