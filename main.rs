mod config;
mod decision;
mod error;
mod inference;
mod labels;
mod models;
mod onnx;
mod output;
mod pipeline;
mod preprocess;
mod session;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{ImageSource, PredictionReport};
use crate::pipeline::Predictor;
use crate::session::{handle_event, read_upload, Event, Outcome, SampleLibrary, SessionContext};

/// Face attribute predictor: race and gender with confidence scores
#[derive(Parser)]
#[command(name = "fairface")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing the classifier models
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Directory containing the bundled sample images
    #[arg(long, global = true)]
    samples_dir: Option<PathBuf>,

    /// Write results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict attributes for a JPG or PNG face image
    Predict { path: PathBuf },
    /// Predict attributes for one of the bundled sample images
    Sample { name: String },
    /// List the bundled sample images
    Samples,
    /// Line-driven session: upload, sample, samples, reset, about, quit
    Interactive,
    /// Show app features, limitations and privacy notice
    About,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(dir) = &cli.models_dir {
        config.models_dir = dir.clone();
    }
    if let Some(dir) = &cli.samples_dir {
        config.samples_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(err.exit_code());
        }
    };
    let samples = SampleLibrary::from_config(&config);
    let mut stdout = std::io::stdout();

    let needs_models = matches!(
        cli.command,
        Commands::Predict { .. } | Commands::Sample { .. } | Commands::Interactive
    );
    if !needs_models {
        let res = match cli.command {
            Commands::Samples => output::write_samples(&mut stdout, &samples.available(), cli.json),
            _ => writeln!(stdout, "{}", output::ABOUT).map_err(Error::from),
        };
        return exit_for(res.map(|_| true));
    }

    let mut predictor = match Predictor::load(&config) {
        Ok(predictor) => predictor,
        Err(err) => {
            log::error!("{err}");
            eprintln!("{}", err.user_message());
            return ExitCode::from(err.exit_code());
        }
    };
    let mut ctx = SessionContext::new();

    let res = match &cli.command {
        Commands::Predict { path } => {
            predict_upload(&mut ctx, &mut predictor, &samples, &config, path, cli.json)
        }
        Commands::Sample { name } => dispatch(
            &mut ctx,
            &mut predictor,
            &samples,
            Event::SelectSample(name.clone()),
            cli.json,
        ),
        Commands::Interactive => interactive(&mut ctx, &mut predictor, &samples, &config, cli.json),
        Commands::Samples | Commands::About => Ok(true),
    };
    exit_for(res)
}

fn exit_for(res: Result<bool>) -> ExitCode {
    match res {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {}", err.user_message());
            ExitCode::from(err.exit_code())
        }
    }
}

/// Writes the outcome of one event. Returns false when the request failed.
fn dispatch(
    ctx: &mut SessionContext,
    predictor: &mut Predictor,
    samples: &SampleLibrary,
    event: Event,
    json: bool,
) -> Result<bool> {
    let mut stdout = std::io::stdout();
    match handle_event(ctx, predictor, samples, event) {
        Outcome::Report(report) => {
            output::write_report(&mut stdout, &report, json)?;
            Ok(report.error.is_none())
        }
        Outcome::Samples(names) => {
            output::write_samples(&mut stdout, &names, json)?;
            Ok(true)
        }
        Outcome::Cleared => {
            if !json {
                writeln!(stdout, "Session reset")?;
            }
            Ok(true)
        }
    }
}

fn predict_upload(
    ctx: &mut SessionContext,
    predictor: &mut Predictor,
    samples: &SampleLibrary,
    config: &AppConfig,
    path: &Path,
    json: bool,
) -> Result<bool> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    match read_upload(config, path) {
        Ok(bytes) => dispatch(ctx, predictor, samples, Event::Upload { name, bytes }, json),
        Err(err) if !err.is_recoverable() => Err(err),
        Err(err) => {
            log::warn!("[{}] {name}: {err}", ctx.id);
            let report = PredictionReport::failure(ImageSource::Upload(name), err.user_message());
            output::write_report(&mut std::io::stdout(), &report, json)?;
            Ok(false)
        }
    }
}

/// One line of interactive input.
#[derive(Debug, PartialEq)]
enum Command<'a> {
    Blank,
    Quit,
    Help,
    About,
    Upload(&'a str),
    Sample(&'a str),
    Samples,
    Reset,
    Usage(&'static str),
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };
    match cmd {
        "" => Command::Blank,
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        "about" => Command::About,
        "upload" if arg.is_empty() => Command::Usage("usage: upload <path>"),
        "upload" => Command::Upload(arg),
        "sample" if arg.is_empty() => Command::Usage("usage: sample <name>"),
        "sample" => Command::Sample(arg),
        "samples" => Command::Samples,
        "reset" => Command::Reset,
        other => Command::Unknown(other),
    }
}

fn interactive(
    ctx: &mut SessionContext,
    predictor: &mut Predictor,
    samples: &SampleLibrary,
    config: &AppConfig,
    json: bool,
) -> Result<bool> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    log::info!("Interactive session {}", ctx.id);
    writeln!(stdout, "Face Attribute Predictor: Race & Gender Classification")?;
    writeln!(stdout, "Type `help` for commands.")?;
    output::write_samples(&mut stdout, &samples.available(), json)?;
    for line in stdin.lock().lines() {
        let line = line?;
        match parse_command(&line) {
            Command::Blank => continue,
            Command::Quit => break,
            Command::Help => writeln!(
                stdout,
                "upload <path> | sample <name> | samples | reset | about | quit"
            )?,
            Command::About => writeln!(stdout, "{}", output::ABOUT)?,
            Command::Upload(path) => {
                predict_upload(ctx, predictor, samples, config, Path::new(path), json)?;
            }
            Command::Sample(name) => {
                dispatch(ctx, predictor, samples, Event::SelectSample(name.to_string()), json)?;
            }
            Command::Samples => {
                dispatch(ctx, predictor, samples, Event::ListSamples, json)?;
            }
            Command::Reset => {
                dispatch(ctx, predictor, samples, Event::Reset, json)?;
            }
            Command::Usage(hint) => writeln!(stdout, "{hint}")?,
            Command::Unknown(other) => writeln!(stdout, "Unknown command `{other}`; type `help`")?,
        }
        stdout.flush()?;
    }
    Ok(true)
}
