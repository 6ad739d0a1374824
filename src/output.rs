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

use crate::codegen::symbol::{InitValue, Symbol};
use crate::codegen::{Codegen, Trailer};
use std::fmt::Write;

// Serialise the compiled program: header, located symbols in insertion
// order, case tables, anonymous arrays, the optional external assembly,
// the exit trailer, uninitialised storage, and the free-memory mark.
pub fn render(r#gen: &mut Codegen, external: Option<&str>) -> String {
    let mut out = String::new();
    let initialize = r#gen.opts.initialize;

    out.push_str(";\n; File generated by the plmc compiler\n;\n\n\tORG 0100H\n\n");

    for sym in &r#gen.sym_list[r#gen.pseudo_count..] {
        match sym {
            Symbol::Label { name, addr } => {
                let _ = writeln!(out, "{}:     ; {:04x}", name, addr);
            }
            Symbol::CodeBlock { lines, .. } => {
                for line in lines {
                    let _ = writeln!(out, "\t{}", line);
                }
            }
            _ if sym.is_array() => output_array(&mut out, sym, initialize),
            _ => output_variable(&mut out, sym, initialize),
        }
    }

    // dispatch tables for each DO CASE; labels[0] is the END label
    for case in &r#gen.case_list {
        let _ = write!(out, "{}:\tDW  ", case.table);
        let targets = &case.labels[1..];
        for (n, label) in targets.iter().enumerate() {
            out.push_str(label);
            if n != targets.len() - 1 {
                out.push_str(", ");
            }
        }
        out.push('\n');
    }

    // anonymous arrays take the addresses following the code
    let mut pc = r#gen.pc;
    for sym in &mut r#gen.anon_list {
        if let Symbol::Array { addr, size, .. } = sym {
            *addr = pc;
            pc += *size;
        }
    }
    for sym in &r#gen.anon_list {
        output_array(&mut out, sym, initialize);
    }

    if let Some(text) = external {
        out.push('\n');
        for line in text.lines() {
            if !line.is_empty() {
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
    }

    out.push_str("__ENDCOM:\n");
    match r#gen.opts.trailer {
        Trailer::Hlt => out.push_str("\tHLT  ; halt\n"),
        Trailer::Mon => out.push_str("\tRST 001H  ; go to MON80 debug trap\n"),
        Trailer::Ret => out.push_str("\tRET  ; return to caller (CP/M ...)\n"),
    }
    pc += 1;

    // uninitialised storage resolves to addresses past the trailer
    for sym in &mut r#gen.uni_list {
        match sym {
            Symbol::Variable { addr, size, .. } => {
                *addr = pc;
                pc += *size as u32;
            }
            Symbol::Array { addr, size, .. } => {
                *addr = pc;
                pc += *size;
            }
            _ => {}
        }
    }
    for sym in &r#gen.uni_list {
        if sym.is_array() {
            output_array(&mut out, sym, initialize);
        } else {
            output_variable(&mut out, sym, initialize);
        }
    }

    out.push_str("MEMORY:\n");
    out
}

fn init_value_text(value: &InitValue, wide: bool) -> String {
    match value {
        InitValue::Number(n) if wide => format!("{:05X}H", n),
        InitValue::Number(n) => format!("{:03X}H", n),
        InitValue::Ref(name) => name.clone(),
    }
}

fn output_array(out: &mut String, sym: &Symbol, initialize: bool) {
    // overlay and pointer-indirected arrays own no storage
    let Symbol::Array {
        name,
        addr,
        size,
        elem_size,
        value,
    } = sym
    else {
        return;
    };

    let values = match value {
        Some(values) => Some(values.clone()),
        None if initialize => {
            Some(vec![
                InitValue::Number(0);
                (*size / *elem_size as u32) as usize
            ])
        }
        None => None,
    };

    let wide = *elem_size != 1;
    let mut text = if wide {
        format!("{}\tDW  ", name)
    } else {
        format!("{}\tDB  ", name)
    };
    match values {
        None => {
            let count = if wide { *size >> 1 } else { *size };
            let _ = write!(text, "{}  DUP(?)", count);
        }
        Some(values) => {
            for (n, value) in values.iter().enumerate() {
                text.push_str(&init_value_text(value, wide));
                if n != values.len() - 1 {
                    text.push(',');
                }
            }
        }
    }
    let _ = writeln!(out, "{}    ; {:04x}", text, addr);
}

fn output_variable(out: &mut String, sym: &Symbol, initialize: bool) {
    // skip variables referenced by address
    let Symbol::Variable {
        name,
        addr,
        size,
        value,
    } = sym
    else {
        return;
    };

    let value = match value {
        Some(value) => Some(value.clone()),
        None if initialize => Some(InitValue::Number(0)),
        None => None,
    };

    let text = match value {
        None => format!("{}\tDS  {}", name, size),
        Some(value) if *size == 1 => {
            format!("{}\tDB  {}", name, init_value_text(&value, false))
        }
        Some(value) => format!("{}\tDW  {}", name, init_value_text(&value, true)),
    };
    let _ = writeln!(out, "{}    ; {:04x}", text, addr);
}
