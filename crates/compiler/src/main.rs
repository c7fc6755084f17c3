//! Mica compiler CLI.
//!
//! Reads one preprocessed source file and writes QBE IR to stdout or the
//! `-o` file. Per-stage debug dumps are selected with `-L tok,sym,ast`
//! and land in the `-D` file.

use clap::Parser as ClapParser;
use micac::{CompileError, DumpFlags, compile_source};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "micac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mica compiler - compile preprocessed Mica source to QBE IR", long_about = None)]
struct Cli {
    /// Write per-stage debug dumps to this file
    #[arg(short = 'D', value_name = "DEBUGFILE")]
    debug_file: Option<PathBuf>,

    /// Comma-joined dump stages: tok,sym,ast (requires -D)
    #[arg(short = 'L', value_name = "FLAGS")]
    dump_flags: Option<String>,

    /// Output file (defaults to stdout)
    #[arg(short = 'o', value_name = "OUTFILE")]
    output: Option<PathBuf>,

    /// Preprocessed input file
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    run(cli);
}

fn run(cli: Cli) {
    let flags = match parse_dump_flags(&cli) {
        Ok(flags) => flags,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Unable to open {}: {}", cli.input.display(), err);
            process::exit(1);
        }
    };
    let filename = cli.input.display().to_string();

    let mut debug_file = cli.debug_file.as_ref().map(|path| {
        match File::create(path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("Unable to open debug file {}: {}", path.display(), err);
                process::exit(1);
            }
        }
    });
    let debug_sink = debug_file.as_mut().map(|f| f as &mut dyn Write);

    let result = match &cli.output {
        Some(path) => {
            let file = match File::create(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("Unable to open intermediate file {}: {}", path.display(), err);
                    process::exit(1);
                }
            };
            compile_source(&source, &filename, BufWriter::new(file), debug_sink, flags)
                .and_then(|mut out| out.flush().map_err(Into::into))
        }
        None => {
            let stdout = io::stdout();
            compile_source(&source, &filename, stdout.lock(), debug_sink, flags)
                .and_then(|mut out| out.flush().map_err(Into::into))
        }
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        process::exit(1);
    }
}

/// Parse the `-L` flag list. `-L` without `-D` is a usage error, as is an
/// unknown stage name.
fn parse_dump_flags(cli: &Cli) -> Result<DumpFlags, CompileError> {
    let mut flags = DumpFlags::default();
    let Some(list) = &cli.dump_flags else {
        return Ok(flags);
    };

    if cli.debug_file.is_none() {
        return Err(CompileError::Usage(
            "-L used with no -D debug file".to_string(),
        ));
    }
    for stage in list.split(',') {
        match stage {
            "tok" => flags.tokens = true,
            "sym" => flags.syms = true,
            "ast" => flags.ast = true,
            other => {
                return Err(CompileError::Usage(format!(
                    "unknown -L flag {}, expected tok,sym,ast",
                    other
                )));
            }
        }
    }
    Ok(flags)
}
