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

use super::Codegen;
use super::symbol::Symbol;

impl Codegen {
    // Append one instruction line to the pending buffer and advance the
    // program counter by its encoded size.
    pub(crate) fn emit(&mut self, line: String, bytes: u32) {
        self.code.push(line);
        self.pc += bytes;
    }

    // Seal the pending buffer into a CodeBlock symbol. The peephole
    // pass runs here, before the block size is fixed, so the PC and the
    // block agree on every byte.
    pub(crate) fn emit_code(&mut self) {
        if !self.code.is_empty() {
            if self.opts.optimize {
                self.optimize();
            }
            let lines = std::mem::take(&mut self.code);
            self.sym_list.push(Symbol::CodeBlock {
                addr: self.pc_save,
                size: self.pc - self.pc_save,
                lines,
            });
            self.state_count += 1;
        }
        self.pc_save = self.pc;
    }

    // Add a new label to the symbol table at the current address.
    pub(crate) fn emit_label(&mut self, name: &str) {
        self.emit_code();
        self.sym_list.push(Symbol::Label {
            name: name.to_string(),
            addr: self.pc,
        });
        self.state_count += 1;
    }

    pub(crate) fn new_label(&mut self) -> String {
        let label = format!("__L{:05}", self.label_n);
        self.label_n += 1;
        label
    }

    // Mark the start of a new statement. pop_statement() uses the mark
    // to decide which symbols belong to the statement being rewritten.
    pub(crate) fn mark_statement(&mut self) {
        self.emit_code();
        self.state_count = 0;
    }

    // Remove the symbols belonging to the last statement from the
    // symbol table and return them in original order. The PC is rolled
    // back by the size of any code blocks removed.
    pub(crate) fn pop_statement(&mut self) -> Vec<Symbol> {
        self.emit_code();
        let mut popped = Vec::new();
        if self.exec_state {
            for _ in 0..self.state_count {
                if self.sym_list.len() <= self.pseudo_count {
                    break;
                }
                let sym = match self.sym_list.pop() {
                    Some(sym) => sym,
                    None => break,
                };
                if let Symbol::CodeBlock { size, .. } = sym {
                    self.pc -= size;
                }
                popped.push(sym);
            }
            popped.reverse();
        }
        // the next pending block starts at the rolled-back address
        self.pc_save = self.pc;
        popped
    }

    // Re-append previously popped symbols after spliced-in code,
    // shifting their addresses past it.
    pub(crate) fn replay(&mut self, symbols: Vec<Symbol>, shift: u32) {
        for mut sym in symbols {
            if let Symbol::CodeBlock { size, .. } = sym {
                self.pc += size;
            }
            sym.shift_addr(shift);
            self.sym_list.push(sym);
            self.state_count += 1;
        }
    }

    // Terminate the instruction stream: fall through to the trailer, or
    // return to it when a start procedure owns the stack.
    pub(crate) fn fixup(&mut self) {
        if self.opts.start.is_none() {
            self.emit("JMP __ENDCOM  ; program end".to_string(), 3);
        } else {
            self.emit("RET  ; program end".to_string(), 1);
        }
        self.emit_code();
    }
}
