use std::fs;
use std::path::{Path, PathBuf};

use rivet_errors::AssemblyError;

use crate::Assembler;

/// Where one assembly run reads its source and writes its listing.
#[derive(Debug)]
pub struct Configuration {
    input_file: PathBuf,
    output_file: PathBuf,
}

impl Configuration {
    /// Creates a configuration from the two command-line paths.
    pub fn new(input_file: PathBuf, output_file: PathBuf) -> Self {
        Self { input_file, output_file }
    }

    /// Reads the source, drives an [`Assembler`] over it, and writes the
    /// object listing.
    pub fn generate(self) -> Result<(), AssemblyError> {
        let io_error = |path: &Path| {
            let path = path.display().to_string();

            move |source| AssemblyError::Io { path, source }
        };

        let source =
            fs::read_to_string(&self.input_file).map_err(io_error(&self.input_file))?;

        let mut assembler = Assembler::new();
        assembler.assemble(&source)?;

        let mut output =
            fs::File::create(&self.output_file).map_err(io_error(&self.output_file))?;

        assembler.write_listing(&mut output).map_err(io_error(&self.output_file))?;

        Ok(())
    }
}
