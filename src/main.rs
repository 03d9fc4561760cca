use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use colored::Colorize;

use exas::parsing::parse_with_limits;
use exas::service::SubmitStepResponse;
use exas::{Difficulty, EngineConfig, ExerciseService, SessionId};

#[derive(Parser, Debug)]
#[command(name = "exas")]
#[command(about = "Rewrite propositional formulas into DNF, one rule at a time")]
struct Args {
	/// JSON config with engine limits and generator settings
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Seed for the exercise generator
	#[arg(short, long)]
	seed: Option<u64>,

	/// Difficulty of the first exercise: easy, normal or difficult
	#[arg(short, long, default_value_t = Difficulty::Normal)]
	difficulty: Difficulty,

	/// Read JSON requests line by line and answer with JSON lines
	#[arg(long)]
	json: bool,

	/// File to load sessions from at start and save them to at exit
	#[arg(long)]
	sessions: Option<PathBuf>,

	/// Debug logging to stderr
	#[arg(short, long)]
	verbose: bool,
}

const HELP: &str = "\
commands:
  new [easy|normal|difficult]  start a new exercise
  step <expression>            submit the next expression (or just type it)
  undo, redo                   move through the history
  hint                         which rule to apply next, and where
  next                         let the engine make the next step
  ready                        check whether the current expression is the answer
  derivation                   show a full derivation from the current expression
  reset                        go back to the start of the exercise
  show                         show the current expression
  help                         this message
  quit                         exit";

fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = Args::parse();

	simplelog::TermLogger::init(
		if args.verbose { simplelog::LevelFilter::Debug } else { simplelog::LevelFilter::Warn },
		simplelog::Config::default(),
		simplelog::TerminalMode::Stderr,
		simplelog::ColorChoice::Auto,
	)?;

	let mut config = match &args.config {
		Some(path) => EngineConfig::from_file(path)?,
		None => EngineConfig::default(),
	};
	if args.seed.is_some() {
		config.generator.seed = args.seed;
	}

	let service = ExerciseService::new(&config)?;
	if let Some(path) = args.sessions.as_ref().filter(|path| path.exists()) {
		service
			.store()
			.load(path, service.rules(), service.settings())
			.wrap_err_with(|| format!("can't load sessions from {}", path.display()))?;
	}

	if args.json {
		let stdin = io::stdin();
		let mut stdout = io::stdout();
		for line in stdin.lock().lines() {
			let line = line?;
			if line.trim().is_empty() {
				continue;
			}
			writeln!(stdout, "{}", service.handle_json(&line))?;
			stdout.flush()?;
		}
	} else {
		interactive(&service, args.difficulty)?;
	}

	if let Some(path) = &args.sessions {
		service.store().save(path)?;
	}
	Ok(())
}

fn print_step(response: &SubmitStepResponse) {
	if response.accepted {
		let rule = response.rule.map(|rule| rule.to_string()).unwrap_or_default();
		println!("{} by {}", "accepted".green().bold(), rule.bold());
	} else {
		println!("{}: {}", "rejected".red().bold(), response.reason.as_deref().unwrap_or(""));
	}
	println!("{:>3}: {}", response.step_count, response.current_expression_text);
	if response.new_state == exas::SessionState::Solved {
		println!("{}", "solved!".green().bold());
	}
}

/// Новое упражнение; предыдущая сессия закрывается, чтобы не попасть в файл сессий.
fn start(service: &ExerciseService, difficulty: Difficulty, previous: Option<SessionId>) -> color_eyre::Result<SessionId> {
	let response = match previous {
		Some(previous) => service.replace_exercise(previous, difficulty)?,
		None => service.new_exercise(difficulty, None)?,
	};
	println!("{} exercise, bring to DNF:", difficulty.to_string().bold());
	println!("  0: {}", response.start_expression_text);
	Ok(response.session_id)
}

fn interactive(service: &ExerciseService, difficulty: Difficulty) -> color_eyre::Result<()> {
	println!("{}", HELP.dimmed());
	let mut session = start(service, difficulty, None)?;

	let stdin = io::stdin();
	loop {
		print!("> ");
		io::stdout().flush()?;
		let mut line = String::new();
		if stdin.lock().read_line(&mut line)? == 0 {
			break;
		}
		let line = line.trim();
		let (command, rest) = match line.find(' ') {
			Some(index) => (&line[..index], line[index..].trim()),
			None => (line, ""),
		};

		let result: color_eyre::Result<()> = match command {
			"" => Ok(()),
			"quit" | "exit" => break,
			"help" => {
				println!("{}", HELP);
				Ok(())
			},
			"new" => {
				let difficulty = if rest.is_empty() { Ok(difficulty) } else { rest.parse::<Difficulty>() };
				match difficulty {
					Ok(difficulty) => start(service, difficulty, Some(session)).map(|id| session = id),
					Err(err) => Err(eyre!(err)),
				}
			},
			"undo" | "redo" | "reset" => {
				let response = match command {
					"undo" => service.undo(session),
					"redo" => service.redo(session),
					_ => service.reset(session),
				};
				response.map_err(|err| eyre!(err)).map(|response| {
					if let Some(note) = response.note {
						println!("{}", note.yellow());
					}
					println!("{:>3}: {}", response.step_count, response.current_expression_text);
				})
			},
			"show" => service.show(session).map_err(|err| eyre!(err)).map(|response| {
				println!("{:>3}: {}", response.step_count, response.current_expression_text);
			}),
			"hint" => service.hint(session).map_err(|err| eyre!(err)).map(|hint| {
				println!("{} {}: {}", "hint:".yellow().bold(), hint.rule.to_string().bold(), hint.rule_description);
				println!("     {}", hint.expression_text);
				if let Some(marker) = hint.target_marker {
					println!("     {}", marker.yellow());
				}
			}),
			"next" => service.next(session).map_err(|err| eyre!(err)).map(|response| print_step(&response)),
			"ready" => service.ready(session).map_err(|err| eyre!(err)).map(|response| {
				let message = if response.solved { response.message.green() } else { response.message.yellow() };
				println!("{}", message);
			}),
			"derivation" => service.derivation(session).map_err(|err| eyre!(err)).map(|response| {
				println!("  0: {}", response.start_expression_text);
				for (index, step) in response.steps.iter().enumerate() {
					println!("{:>3}: {}    {}", index + 1, step.expression_text, step.rule.to_string().dimmed());
				}
				if !response.complete {
					println!("{}", "no full derivation was found".yellow());
				}
			}),
			_ => {
				let text = if command == "step" { rest } else { line };
				match parse_with_limits(text, &service.parse_limits()) {
					Err(err) => {
						println!("{}", err.snippet(text, true));
						Ok(())
					},
					Ok(_) => service.submit_step(session, text).map_err(|err| eyre!(err)).map(|response| print_step(&response)),
				}
			},
		};
		if let Err(err) = result {
			println!("{}: {}", "error".red().bold(), err);
		}
	}
	Ok(())
}
