//! FerroJit compiler test-suite runner
//!
//! Emits, compiles, loads and runs every built-in conformance test against the
//! host backend and reports per-test status plus a summary.
//!
//! # Usage
//!
//! ```bash
//! # Run everything
//! fj-cc
//!
//! # Only the call tests, with diagnostics streamed as they are produced
//! fj-cc --filter FuncCall --verbose
//!
//! # Print disassembly of every test
//! fj-cc --dump-asm
//! ```

use clap::{Parser, ValueEnum};
use fj_cli::{
    cli::{CliConfig, EnvOverrides, FlagOverrides},
    diagnostics::{render_cli_error, setup_error_reporting},
    CliError, Result,
};
use fj_harness::{HarnessDriver, HarnessOptions, TestRegistry};
use fj_jit::{host_arch, host_pointer_bits, OptLevel};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "fj-cc",
    version = env!("CARGO_PKG_VERSION"),
    about = "FerroJit compiler test-suite: emits small programs, runs them and checks their results"
)]
struct Cli {
    /// Stream compiler diagnostics while tests run
    #[arg(long)]
    verbose: bool,

    /// Print the disassembly of every compiled test
    #[arg(long)]
    dump_asm: bool,

    /// Only run tests whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// List test names and exit
    #[arg(long)]
    list: bool,

    /// Code generator optimization level (none, speed, speed_and_size)
    #[arg(long)]
    opt_level: Option<OptLevel>,

    /// Skip the IR verifier
    #[arg(long)]
    no_verifier: bool,

    /// Never color the report
    #[arg(long)]
    no_color: bool,

    /// Increase log verbosity (use multiple times)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    log_verbosity: u8,

    /// Suppress non-error log output
    #[arg(short, long)]
    quiet: bool,

    /// Set log level (overrides -v/--quiet)
    #[arg(long, value_enum)]
    log: Option<LogLevel>,

    /// Set log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            if !render_cli_error(&e) {
                eprintln!("error: {e}");
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    setup_error_reporting()?;
    setup_logging(cli.log_verbosity, cli.quiet, cli.log, cli.log_format)?;

    let registry = TestRegistry::with_fixtures();
    if cli.list {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for name in registry.names() {
            writeln!(out, "{name}")?;
        }
        return Ok(0);
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let flags = FlagOverrides {
        verbose: cli.verbose,
        dump_asm: cli.dump_asm,
        filter: cli.filter,
        opt_level: cli.opt_level,
        no_verifier: cli.no_verifier,
        no_color: cli.no_color,
    };
    let options = config.harness_options(EnvOverrides::from_env(), &flags, console::colors_enabled());
    debug!(?options, "resolved harness options");

    let stdout = io::stdout();
    print_banner(&mut stdout.lock(), &options)?;

    let mut driver = HarnessDriver::new(options, stdout.lock());
    let summary = driver.run(&registry)?;
    Ok(summary.exit_code())
}

fn print_banner(out: &mut impl Write, options: &HarnessOptions) -> io::Result<()> {
    let mark = |on: bool| if on { 'x' } else { ' ' };
    writeln!(
        out,
        "FerroJit Compiler Test-Suite v{} [Arch={} Bits={}]",
        env!("CARGO_PKG_VERSION"),
        host_arch(),
        host_pointer_bits()
    )?;
    writeln!(
        out,
        "  [{}] Verbose (use --verbose to turn verbose output ON)",
        mark(options.verbose)
    )?;
    writeln!(
        out,
        "  [{}] DumpAsm (use --dump-asm to turn assembler dumps ON)",
        mark(options.dump_asm)
    )?;
    writeln!(out)?;
    out.flush()
}

fn setup_logging(verbose: u8, quiet: bool, log_level: Option<LogLevel>, log_format: LogFormat) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if let Some(level) = log_level {
        EnvFilter::new(match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true);

    let result = match log_format {
        LogFormat::Pretty => tracing_subscriber::registry().with(formatter).with(filter).try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(formatter.json())
            .with(filter)
            .try_init(),
    };
    result.map_err(|e| CliError::Config(format!("Failed to setup logging: {}", e)))
}
