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

pub mod ast;
pub mod codegen;
pub mod errors;
pub mod output;
pub mod parser;

use anyhow::{Context, Result};

pub use codegen::{Options, Trailer};

pub struct Compilation {
    pub asm: String,
    pub warnings: Vec<String>,
}

// Compile one PL/M source text to 8080 assembly text. `external` is an
// assembly file inlined verbatim ahead of the exit trailer. File I/O
// stays with the caller so the compiler can be driven from strings.
pub fn compile(source: &str, external: Option<&str>, opts: &Options) -> Result<Compilation> {
    let expanded =
        parser::expand_literals(source).context("Failed during literal expansion")?;

    let stmts = parser::parse_source(&expanded).context("Failed during parsing stage")?;

    let mut r#gen = codegen::Codegen::new(opts.clone());
    r#gen.run(&stmts).context("Failed during code generation")?;

    let warnings = r#gen.take_warnings();
    let asm = output::render(&mut r#gen, external);

    Ok(Compilation { asm, warnings })
}
