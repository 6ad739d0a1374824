/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use clap::ValueEnum;
use plmc::{Options, Trailer, compile};
use std::fs;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0")]
struct Opts {
    /// input PL/M file
    input: PathBuf,
    /// output 8080 ASM file
    output: PathBuf,
    /// program start procedure
    #[clap(short, long)]
    start: Option<String>,
    /// optimize
    #[clap(short, long)]
    optimize: bool,
    /// 8080 ASM file containing EXTERNAL procedures
    #[clap(short, long)]
    external: Option<PathBuf>,
    /// initialize data variables to zero
    #[clap(short, long)]
    initialize: bool,
    /// program termination option
    #[clap(short, long, value_enum, default_value = "ret")]
    trailer: TrailerOpt,
}

#[derive(Copy, Clone, PartialEq, ValueEnum)]
enum TrailerOpt {
    Hlt,
    Ret,
    Mon,
}

impl From<TrailerOpt> for Trailer {
    fn from(opt: TrailerOpt) -> Self {
        match opt {
            TrailerOpt::Hlt => Trailer::Hlt,
            TrailerOpt::Ret => Trailer::Ret,
            TrailerOpt::Mon => Trailer::Mon,
        }
    }
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    let source = fs::read_to_string(&opts.input)
        .with_context(|| format!("Failed to read input file: {}", opts.input.display()))?;

    let external = match &opts.external {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read external file: {}", path.display()))?,
        ),
        None => None,
    };

    let options = Options {
        optimize: opts.optimize,
        initialize: opts.initialize,
        start: opts.start.clone(),
        trailer: opts.trailer.into(),
    };

    let result = compile(&source, external.as_deref(), &options)?;
    for warning in &result.warnings {
        eprintln!("WARNING: {}", warning);
    }

    fs::write(&opts.output, result.asm)?;
    println!(
        "Successfully compiled {} to {}",
        opts.input.display(),
        opts.output.display()
    );

    Ok(())
}
