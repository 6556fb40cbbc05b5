use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, ValueEnum, error::ErrorKind};
use indoc::indoc;
use tracing::{info, level_filters::LevelFilter};
use viperc::{
    frontend::{SourceFile, SourceFileOrigin},
    middle::{
        il::{parse::parse_module, pretty_print::pretty_print_module},
        optimization::{PipelineOptions, run_pipeline},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, ClapParser)]
#[command(
    version,
    about = "Verify and optimise textual Viper IL",
    long_about = None,
    after_help = indoc! {"
        Each input is parsed, verified, promoted to SSA with mem2reg and
        verified again. The resulting IL is written to standard output.
    "}
)]
pub struct Args {
    /// Textual IL files to process
    #[arg(value_name = "FILES")]
    source_files: Vec<PathBuf>,

    /// Skip the mem2reg pass
    #[arg(long)]
    no_mem2reg: bool,

    /// Skip verification before and after the passes
    #[arg(long)]
    no_verify: bool,

    /// Print pass statistics to standard error
    #[arg(long)]
    stats: bool,

    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Increase logging verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match args.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }
    let colored = colored::control::SHOULD_COLORIZE.should_colorize();

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    let options = PipelineOptions {
        verify: !args.no_verify,
        mem2reg: !args.no_mem2reg,
    };

    let mut status = ExitCode::SUCCESS;
    for path in args.source_files {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) => {
                Args::command()
                    .error(
                        ErrorKind::Io,
                        format!("Failed to read '{}': {error}", path.display()),
                    )
                    .exit();
            }
        };
        let source_file = SourceFile {
            contents,
            origin: SourceFileOrigin::File(path),
        };

        if !process(&source_file, &options, args.stats, colored) {
            status = ExitCode::FAILURE;
        }
    }

    status
}

/// Runs one file through the pipeline, printing the result or the first
/// error. Returns whether the file was accepted.
fn process(
    source_file: &SourceFile,
    options: &PipelineOptions,
    stats: bool,
    colored: bool,
) -> bool {
    let origin = &source_file.origin;

    let mut module = match parse_module(&source_file.contents) {
        Ok(module) => module,
        Err(error) => {
            eprintln!("{origin}: {}", viperc::Error::from(error));
            return false;
        }
    };

    let report = match run_pipeline(&mut module, options) {
        Ok(report) => report,
        Err(error) => {
            eprint!("{origin}: {}", error.render(&module));
            return false;
        }
    };

    info!(%origin, functions = report.functions, "processed");
    if stats {
        eprintln!("{origin}: {} function(s), {}", report.functions, report.mem2reg);
    }

    print!("{}", pretty_print_module(&module, colored));
    true
}
