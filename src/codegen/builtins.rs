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
use super::symbol::{Builtin, Symbol};
use crate::ast::Expr;
use crate::errors::CompileError;

// Built-in procedures emit inline at the call site. LENGTH and LAST
// fold to constants from array metadata; the rest operate on values
// already collapsed into the register banks.
impl Codegen {
    pub(crate) fn builtin_call1(
        &mut self,
        kind: Builtin,
        arg: &Expr,
        left: bool,
    ) -> Result<u8, CompileError> {
        match kind {
            Builtin::Length => self.builtin_length(arg, left),
            Builtin::Last => self.builtin_last(arg, left),
            Builtin::Low => self.builtin_low(arg, left),
            Builtin::High => self.builtin_high(arg, left),
            Builtin::Double => self.builtin_double(arg, left),
            _ => Err(self.err("builtin takes 2 arguments")),
        }
    }

    pub(crate) fn builtin_call2(
        &mut self,
        kind: Builtin,
        a: &Expr,
        b: &Expr,
        left: bool,
    ) -> Result<u8, CompileError> {
        match kind {
            Builtin::Shr => self.builtin_shr(a, b, left),
            Builtin::Shl => self.builtin_shl(a, b, left),
            Builtin::Ror => self.builtin_ror(a, b, left),
            Builtin::Rol => self.builtin_rol(a, b, left),
            _ => Err(self.err("builtin takes 1 argument")),
        }
    }

    fn array_arg(&self, arg: &Expr, what: &str) -> Result<Symbol, CompileError> {
        let name = match arg {
            Expr::Name(name) => name,
            _ => return Err(self.err(format!("{} argument not an array", what))),
        };
        self.lookup_sym(name)
            .filter(|s| s.is_array())
            .ok_or_else(|| self.err(format!("{} argument {} not an array", what, name)))
    }

    fn builtin_length(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let sym = self.array_arg(arg, "LENGTH")?;
        let num_elements = sym.array_size().unwrap_or(0) / sym.elem_size().unwrap_or(1) as u32;
        if num_elements > 0xFF {
            if left {
                self.emit(
                    format!("LXI D,{:05X}H  ; LENGTH high left", num_elements),
                    3,
                );
            } else {
                self.emit(
                    format!("LXI B,{:05X}H  ; LENGTH high right", num_elements),
                    3,
                );
            }
            Ok(2)
        } else {
            if left {
                self.emit(format!("MVI E,{:03X}H  ; LENGTH low left", num_elements), 2);
            } else {
                self.emit(
                    format!("MVI C,{:03X}H  ; LENGTH low right", num_elements),
                    2,
                );
            }
            Ok(1)
        }
    }

    fn builtin_last(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let sym = self.array_arg(arg, "LAST")?;
        if sym.array_size().unwrap_or(0) == 0 {
            return Err(self.err(format!("LAST argument array {} is zero size", sym.name())));
        }
        let index = sym.array_size().unwrap_or(0) / sym.elem_size().unwrap_or(1) as u32 - 1;
        if index > 0xFF {
            if left {
                self.emit(format!("LXI D,{:05X}H  ; LAST high left", index), 3);
            } else {
                self.emit(format!("LXI B,{:05X}H  ; LAST high right", index), 3);
            }
            Ok(2)
        } else {
            if left {
                self.emit(format!("MVI E,{:03X}H  ; LAST low left", index), 2);
            } else {
                self.emit(format!("MVI C,{:03X}H  ; LAST low right", index), 2);
            }
            Ok(1)
        }
    }

    fn builtin_low(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let width = self.unary_get_arg(arg, left)?;
        if width != 2 {
            return Err(self.err("LOW argument not ADDRESS"));
        }
        if !left {
            self.emit("MOV C,E  ; LOW right".to_string(), 1);
        }
        self.unary_exit(arg, left);
        Ok(1)
    }

    fn builtin_high(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let width = self.unary_get_arg(arg, left)?;
        if width != 2 {
            return Err(self.err("HIGH argument not ADDRESS"));
        }
        if left {
            self.emit("MOV E,D  ; HIGH left".to_string(), 1);
        } else {
            self.emit("MOV C,D  ; HIGH right".to_string(), 1);
        }
        self.unary_exit(arg, left);
        Ok(1)
    }

    fn builtin_double(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let width = self.unary_get_arg(arg, left)?;
        if width != 1 {
            return Err(self.err("DOUBLE argument not BYTE"));
        }
        if left {
            self.emit("MVI D,000H  ; DOUBLE left".to_string(), 2);
        } else {
            self.emit("MOV C,E".to_string(), 1);
            self.emit("MVI B,000H  ; DOUBLE right".to_string(), 2);
        }
        self.unary_exit(arg, left);
        Ok(2)
    }

    // Count-loop shifts: value in (D),E, count in C.

    fn builtin_shr(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if rw != 1 {
            self.warn("SHR arg 2 overflow".to_string());
        }
        let loop_top = self.new_label();
        self.emit_label(&loop_top);
        self.emit("ORA A  ; clear carry".to_string(), 1);
        if lw == 2 {
            self.emit("MOV A,D".to_string(), 1);
            self.emit("RAR".to_string(), 1);
            self.emit("MOV D,A".to_string(), 1);
        }
        self.emit("MOV A,E".to_string(), 1);
        self.emit("RAR  ; SHR".to_string(), 1);
        self.emit("MOV E,A".to_string(), 1);
        self.emit("DCR C".to_string(), 1);
        self.emit(format!("JNZ {}  ; more SHR", loop_top), 3);
        if !left {
            self.emit("MOV C,E  ; SHR right".to_string(), 1);
            if lw == 2 {
                self.emit("MOV B,D".to_string(), 1);
            }
        }
        Ok(lw)
    }

    fn builtin_shl(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if rw != 1 {
            self.warn("SHL arg 2 overflow".to_string());
        }
        let loop_top = self.new_label();
        self.emit_label(&loop_top);
        self.emit("ORA A  ; clear carry".to_string(), 1);
        self.emit("MOV A,E".to_string(), 1);
        self.emit("RAL  ; SHL".to_string(), 1);
        self.emit("MOV E,A".to_string(), 1);
        if lw == 2 {
            self.emit("MOV A,D".to_string(), 1);
            self.emit("RAL".to_string(), 1);
            self.emit("MOV D,A".to_string(), 1);
        }
        self.emit("DCR C".to_string(), 1);
        self.emit(format!("JNZ {}  ; more SHL", loop_top), 3);
        if !left {
            self.emit("MOV C,E  ; SHL right".to_string(), 1);
            if lw == 2 {
                self.emit("MOV B,D".to_string(), 1);
            }
        }
        Ok(lw)
    }

    fn builtin_ror(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if lw != 1 || rw != 1 {
            return Err(self.err("ROR arg overflow"));
        }
        let loop_top = self.new_label();
        self.emit_label(&loop_top);
        self.emit("MOV A,E".to_string(), 1);
        self.emit("RRC  ; ROR".to_string(), 1);
        self.emit("MOV E,A".to_string(), 1);
        self.emit("DCR C".to_string(), 1);
        self.emit(format!("JNZ {}  ; more ROR", loop_top), 3);
        if !left {
            self.emit("MOV C,E  ; ROR right".to_string(), 1);
        }
        Ok(1)
    }

    fn builtin_rol(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if lw != 1 || rw != 1 {
            self.warn("ROL arg overflow".to_string());
        }
        let loop_top = self.new_label();
        self.emit_label(&loop_top);
        self.emit("MOV A,E".to_string(), 1);
        self.emit("RLC  ; ROL".to_string(), 1);
        self.emit("MOV E,A".to_string(), 1);
        self.emit("DCR C".to_string(), 1);
        self.emit(format!("JNZ {}  ; more ROL", loop_top), 3);
        if !left {
            self.emit("MOV C,E  ; ROL right".to_string(), 1);
        }
        Ok(1)
    }
}
