//! `rivet-bin` is the executable of the `rivet` assembler.
//!
//! This crate contains all the implementation to make `assembler` an
//! executable that can be used by happy users.

mod error;

use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    process,
};

use argh::FromArgs;
use error::Error;
use rivet_assembler::Configuration;
use rivet_errors::Result;

const USAGE: &str = "Invalid call parameters. Syntax is assembler -o output_file input_file";

/// The `assembler` command translates one assembly source file for the
/// 16-bit educational architecture into a textual object listing: symbol
/// table, section table, and per-section relocations and machine bytes.
#[derive(Debug, FromArgs)]
struct Cli {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// specify the name and location of the output listing.
    #[argh(option, short = 'o')]
    output_file: Option<PathBuf>,

    /// input source file.
    #[argh(positional)]
    input_file: Option<PathBuf>,
}

impl Cli {
    /// Creates a new `Self` type based on [`std::env::args_os`].
    fn new() -> Result<Self, Error> {
        // Collect all arguments.
        let arguments =
            env::args_os().map(OsString::into_string).collect::<Result<Vec<_>, _>>().map_err(
                |argument| Error::InvalidArgumentEncoding(argument.to_string_lossy().to_string()),
            )?;

        // Check whether `argv` is present.
        if arguments.is_empty() {
            return Err(Error::ProgramNameIsMissing);
        }

        // Extract the base command from a path.
        let command = Path::new(&arguments[0])
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .unwrap_or(&arguments[0]);

        // Extract all arguments.
        let arguments =
            arguments.iter().skip(1).map(|argument| argument.as_str()).collect::<Vec<_>>();

        // Parse and build `Self`.
        match Cli::from_args(&[command], &arguments) {
            Ok(cli) => Ok(cli),
            Err(early_exit) => match early_exit.status {
                // The command was parsed successfully and the early exit is due to a flag like
                // `--help` causing early exit with output.
                Ok(()) => {
                    println!("{}", early_exit.output);

                    process::exit(0);
                }

                // The arguments were not successfully parsed.
                Err(()) => Err(Error::CommandLine(early_exit.output.trim().to_string())),
            },
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    // Install the error report.
    Error::install_and_configure()?;

    // Build the command-line arguments.
    let cli = Cli::new()?;

    // Handle the `--explain` option.
    if let Some(error_code) = cli.explain {
        println!("{}", Error::explain(&error_code)?);

        return Ok(());
    }

    let (Some(output_file), Some(input_file)) = (cli.output_file, cli.input_file) else {
        println!("{USAGE}");

        process::exit(1);
    };

    // Configure and run the assembler.
    let configuration = Configuration::new(input_file, output_file);

    if let Err(error) = configuration.generate() {
        // Assembly diagnostics go to standard output and the process still
        // exits 0; only command-line errors exit nonzero.
        println!("{:?}", miette::Report::new(error));

        return Ok(());
    }

    println!("Output file is generated.");

    Ok(())
}
