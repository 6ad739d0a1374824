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

use super::symbol::{AtTarget, InitValue, Procedure, Symbol};
use super::{Codegen, FLAG_NAMES, Resolved};
use crate::ast::{BinOp, Expr, InitItem, RefTarget};
use crate::errors::CompileError;

// Collapse walks an expression subtree and emits instructions leaving
// its value in the requested register bank: DE for the left operand of
// the enclosing context, BC for the right. The returned width is 1
// (BYTE, low register only) or 2 (ADDRESS, full pair).
impl Codegen {
    pub(crate) fn collapse_left(&mut self, expr: &Expr) -> Result<u8, CompileError> {
        self.collapse(expr, true)
    }

    pub(crate) fn collapse_right(&mut self, expr: &Expr) -> Result<u8, CompileError> {
        self.collapse(expr, false)
    }

    fn collapse(&mut self, expr: &Expr, left: bool) -> Result<u8, CompileError> {
        match expr {
            Expr::Number(n) => self.collapse_const(*n, left),
            Expr::Name(name) => match self.lookup(name) {
                Some(Resolved::Proc(_)) => self.call0(name, left),
                Some(Resolved::Sym(sym)) if sym.is_scalar() => self.collapse_scalar(&sym, left),
                Some(Resolved::Sym(sym)) if sym.is_array() => {
                    Err(self.err(format!("array {} used without index", name)))
                }
                Some(Resolved::Sym(_)) => {
                    Err(self.err(format!("struct {} used without a member", name)))
                }
                None => Err(self.err(format!("unknown identifier {}", name))),
            },
            Expr::NameParen(name, index) => match self.lookup(name) {
                Some(Resolved::Sym(sym)) if sym.is_array() => {
                    self.collapse_array(&sym, index, left)
                }
                Some(Resolved::Proc(proc)) => {
                    if !matches!(proc, Procedure::Builtin { .. }) && proc.ret_size() == 0 {
                        return Err(
                            self.err(format!("procedure {} does not return a value", name))
                        );
                    }
                    self.call1(name, index, left)
                }
                Some(Resolved::Sym(_)) => Err(self.err(format!("target {} not an array", name))),
                None => Err(self.err(format!("unknown identifier {}", name))),
            },
            Expr::Call2(name, a, b) => self.call2(name, a, b, left),
            Expr::CallN(name, args) => self.call_ext(name, args, left),
            Expr::Ref { target, index } => self.collapse_reference(target, index.as_deref(), left),
            Expr::Field(name, field) => self.collapse_struct(name, field, left),
            Expr::Assign(name, value) => self.collapse_inplace(name, value, left),
            Expr::Not(arg) => self.collapse_not(arg, left),
            Expr::Binary(op, a, b) => match op {
                BinOp::Add => self.collapse_add(a, b, left),
                BinOp::Sub => self.collapse_sub(a, b, left),
                BinOp::Mul => self.collapse_mul(a, b, left),
                BinOp::Div => self.collapse_div(a, b, left),
                BinOp::Mod => self.collapse_mod(a, b, left),
                BinOp::And => self.collapse_and(a, b, left),
                BinOp::Or => self.collapse_or(a, b, left),
                BinOp::Eq => self.collapse_eq(a, b, left),
                BinOp::Ne => self.collapse_ne(a, b, left),
                BinOp::Lt => self.collapse_lt(a, b, left),
                BinOp::Gt => self.collapse_gt(a, b, left),
                BinOp::Le => self.collapse_le(a, b, left),
                BinOp::Ge => self.collapse_ge(a, b, left),
            },
        }
    }

    // Conditions are relational, logical, or a bare element squeezed to
    // 0/1; arithmetic has no truth value here.
    pub(crate) fn collapse_condition(&mut self, expr: &Expr) -> Result<u8, CompileError> {
        match expr {
            Expr::Binary(op, ..) if op.is_relational() => self.collapse_left(expr),
            Expr::Binary(BinOp::And | BinOp::Or, ..) | Expr::Not(_) => self.collapse_left(expr),
            Expr::Binary(..) => {
                Err(self.err("arithmetic expression cannot be used as a condition"))
            }
            _ => self.collapse_bool(expr, true),
        }
    }

    // ------------- save/restore bookkeeping -------------

    // True when evaluating this node clobbers the DE pair, so a live
    // left value must be parked on the stack around it.
    pub(crate) fn expr_is_operator(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Binary(..)
            | Expr::Not(_)
            | Expr::Assign(..)
            | Expr::Call2(..)
            | Expr::CallN(..) => true,
            Expr::Name(name) | Expr::NameParen(name, _) => {
                matches!(self.lookup(name), Some(Resolved::Proc(_)))
            }
            _ => false,
        }
    }

    fn expr_is_binary_op(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Binary(..) | Expr::Call2(..) | Expr::CallN(..))
    }

    // Evaluate both operands: left into DE, right into BC, saving DE
    // across the right side when it would be clobbered.
    pub(super) fn get_args(&mut self, a: &Expr, b: &Expr) -> Result<(u8, u8), CompileError> {
        let left_width = self.collapse_left(a)?;
        let save = self.expr_is_operator(b);
        if save {
            self.emit("PUSH D ; save left binary".to_string(), 1);
        }
        let right_width = self.collapse_right(b)?;
        if save {
            self.emit("POP D  ; restore left binary".to_string(), 1);
        }
        Ok((left_width, right_width))
    }

    pub(crate) fn unary_get_arg(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        if !left && self.expr_is_binary_op(arg) {
            self.emit("PUSH D  ; save left unary".to_string(), 1);
        }
        self.collapse_left(arg)
    }

    pub(crate) fn unary_exit(&mut self, arg: &Expr, left: bool) {
        if !left && self.expr_is_binary_op(arg) {
            self.emit("POP D  ; restore left unary".to_string(), 1);
        }
    }

    // ------------- leaf loads -------------

    fn collapse_const(&mut self, value: u32, left: bool) -> Result<u8, CompileError> {
        if value < 0x100 {
            if left {
                self.emit(format!("MVI E,{:03X}H  ; load const left", value), 2);
            } else {
                self.emit(format!("MVI C,{:03X}H  ; load const right", value), 2);
            }
            Ok(1)
        } else if value < 0x10000 {
            if left {
                self.emit(format!("LXI D,{:05X}H  ; load const left", value), 3);
            } else {
                self.emit(format!("LXI B,{:05X}H  ; load const right", value), 3);
            }
            Ok(2)
        } else {
            Err(self.err(format!("constant too large {}", value)))
        }
    }

    // The assembler-facing spelling of an AT alias target.
    pub(crate) fn at_base(target: &AtTarget) -> String {
        match target {
            AtTarget::Name(name) => name.clone(),
            AtTarget::Addr(addr) => format!("{:05X}H", addr),
        }
    }

    pub(crate) fn at_name(target: &AtTarget, offset: u32) -> String {
        let mut name = Self::at_base(target);
        if offset > 0 {
            name.push_str(&format!(" + {:05X}H", offset));
        }
        name
    }

    fn collapse_scalar(&mut self, sym: &Symbol, left: bool) -> Result<u8, CompileError> {
        let width = sym.scalar_size().unwrap_or(1);
        let side = if left { "left" } else { "right" };
        if width == 1 {
            if FLAG_NAMES.contains(&sym.name()) {
                return self.collapse_flags(sym.name(), left);
            }
            match sym {
                Symbol::BasedVariable { base, .. } => {
                    self.emit(format!("LHLD {}  ; load based {}", base, side), 3);
                }
                Symbol::AtVariable { target, offset, .. } => {
                    let name = Self::at_name(target, *offset);
                    self.emit(format!("LXI H,{}  ; load var {}", name, side), 3);
                }
                _ => {
                    self.emit(format!("LXI H,{}  ; load var {}", sym.name(), side), 3);
                }
            }
            if left {
                self.emit("MOV E,M   ; to E".to_string(), 1);
            } else {
                self.emit("MOV C,M   ; to C".to_string(), 1);
            }
            Ok(1)
        } else {
            if sym.name() == "STACKPTR" {
                if left {
                    self.emit("LXI H,00000H  ; load STACKPTR left".to_string(), 3);
                    self.emit("DAD SP".to_string(), 1);
                    self.emit("XCHG  ; to D,E".to_string(), 1);
                } else {
                    self.emit("LXI H,00000H  ; load STACKPTR".to_string(), 3);
                    self.emit("DAD SP".to_string(), 1);
                    self.emit("MOV C,L".to_string(), 1);
                    self.emit("MOV B,H ; to B,C".to_string(), 1);
                }
                return Ok(2);
            }
            match sym {
                Symbol::BasedVariable { base, .. } => {
                    self.emit(format!("LHLD {}  ; load based {}", base, side), 3);
                    if left {
                        self.emit("MOV E,M".to_string(), 1);
                        self.emit("INX H".to_string(), 1);
                        self.emit("MOV D,M  ; to D,E".to_string(), 1);
                    } else {
                        self.emit("MOV C,M".to_string(), 1);
                        self.emit("INX H".to_string(), 1);
                        self.emit("MOV B,M  ; to B,C".to_string(), 1);
                    }
                }
                _ => {
                    let name = match sym {
                        Symbol::AtVariable { target, offset, .. } => {
                            Self::at_name(target, *offset)
                        }
                        _ => sym.name().to_string(),
                    };
                    self.emit(format!("LHLD {} ; load var {}", name, side), 3);
                    if left {
                        self.emit("XCHG    ; to D,E".to_string(), 1);
                    } else {
                        self.emit("MOV C,L".to_string(), 1);
                        self.emit("MOV B,H ; to B,C".to_string(), 1);
                    }
                }
            }
            Ok(2)
        }
    }

    // CPU flag pseudo-variables read the live flags through conditional
    // jumps that settle 1 or 0 into the requested bank.
    fn collapse_flags(&mut self, name: &str, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let jump = match name {
            "ZERO" => format!("JNZ {}  ; ZERO", false_label),
            "CARRY" => format!("JNC {}  ; CARRY", false_label),
            "PARITY" => format!("JPO {}  ; PARITY", false_label),
            "SIGN" => format!("JP {}  ; SIGN", false_label),
            _ => return Err(self.err(format!("flag {} not supported", name))),
        };
        self.emit(jump, 3);
        if left {
            self.emit("MVI E,001H  ; flags true left".to_string(), 2);
        } else {
            self.emit("MVI C,001H  ; flags true right".to_string(), 2);
        }
        self.emit(format!("JMP {}", join), 3);
        self.emit_label(&false_label);
        if left {
            self.emit("MVI E,000H  ; flags false left".to_string(), 2);
        } else {
            self.emit("MVI C,000H  ; flags false right".to_string(), 2);
        }
        self.emit_label(&join);
        Ok(1)
    }

    fn collapse_array(
        &mut self,
        sym: &Symbol,
        index: &Expr,
        left: bool,
    ) -> Result<u8, CompileError> {
        let elem_size = sym.elem_size().unwrap_or(1);
        if let Expr::Number(n) = index {
            let num_elements = sym.array_size().unwrap_or(0) / elem_size as u32;
            if num_elements != 0 && *n > num_elements - 1 {
                self.warn(format!("array {} index {} overflow", sym.name(), n));
            }
        }
        let side = if left { "left" } else { "right" };
        if !left {
            self.emit("PUSH D  ; save left array".to_string(), 1);
        }
        let index_width = self.collapse_left(index)?;
        if index_width == 1 {
            self.emit("MVI D,000H  ; zero pad index MSB".to_string(), 2);
        }
        match sym {
            Symbol::BasedArray { base, .. } => {
                self.emit(format!("LHLD {}  ; load arr based {}", base, side), 3);
            }
            Symbol::AtArray { target, .. } => {
                self.emit(
                    format!("LXI H,{}  ; load arr {}", Self::at_base(target), side),
                    3,
                );
            }
            _ => {
                self.emit(format!("LXI H,{}  ; load arr {}", sym.name(), side), 3);
            }
        }
        if elem_size == 2 {
            self.emit("XCHG".to_string(), 1);
            self.emit("DAD H  ; index << 1".to_string(), 1);
        }
        self.emit("DAD D    ; arr offset".to_string(), 1);
        if left {
            self.emit("MOV E,M  ; arr element to (D),E".to_string(), 1);
            if elem_size == 2 {
                self.emit("INX H".to_string(), 1);
                self.emit("MOV D,M".to_string(), 1);
            }
        } else {
            self.emit("MOV C,M  ; arr element to (B),C".to_string(), 1);
            if elem_size == 2 {
                self.emit("INX H".to_string(), 1);
                self.emit("MOV B,M".to_string(), 1);
            }
            self.emit("POP D  ; restore left array".to_string(), 1);
        }
        Ok(elem_size)
    }

    // A .NAME or .(...) reference yields the address of its target.
    // Inline data synthesises an anonymous byte array placed after the
    // code at output time.
    fn collapse_reference(
        &mut self,
        target: &RefTarget,
        index: Option<&Expr>,
        left: bool,
    ) -> Result<u8, CompileError> {
        let raw = match target {
            RefTarget::Name(name) => name.clone(),
            RefTarget::Inline(items) => self.anon_array(items),
        };
        let resolved = self.lookup(&raw);
        let sym = match resolved {
            Some(Resolved::Sym(sym)) => Some(sym),
            _ => None,
        };
        let display = match &sym {
            Some(Symbol::AtVariable { target, .. }) | Some(Symbol::AtArray { target, .. }) => {
                Self::at_base(target)
            }
            Some(other) => other.name().to_string(),
            None => raw.clone(),
        };
        let side = if left { "left" } else { "right" };

        match index {
            None => {
                if let Some(Symbol::BasedArray { base, .. }) = &sym {
                    self.emit(format!("LHLD {}  ; load ref {}", base, side), 3);
                } else if left {
                    self.emit(format!("LXI D,{}  ; load ref left", display), 3);
                } else {
                    self.emit(format!("LXI B,{}  ; load ref right", display), 3);
                }
                Ok(2)
            }
            Some(index) => {
                let elem_size = match sym.as_ref().and_then(|s| s.elem_size()) {
                    Some(size) => size,
                    None => {
                        return Err(self.err(format!("reference target {} not an array", raw)));
                    }
                };
                if !left {
                    self.emit("PUSH D  ; save left ref".to_string(), 1);
                }
                let index_width = self.collapse_left(index)?;
                if index_width == 1 {
                    self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
                }
                if let Some(Symbol::BasedArray { base, .. }) = &sym {
                    self.emit(format!("LHLD {}  ; load ref {}", base, side), 3);
                } else {
                    self.emit(format!("LXI H,{}  ; load ref {}", display, side), 3);
                }
                if elem_size == 2 {
                    self.emit("XCHG".to_string(), 1);
                    self.emit("DAD H  ; index << 1".to_string(), 1);
                }
                self.emit("DAD D    ; ref offset".to_string(), 1);
                if left {
                    self.emit("XCHG     ; to D,E".to_string(), 1);
                } else {
                    self.emit("MOV C,L  ; to B,C".to_string(), 1);
                    self.emit("MOV B,H".to_string(), 1);
                    self.emit("POP D  ; restore left ref".to_string(), 1);
                }
                Ok(2)
            }
        }
    }

    fn anon_array(&mut self, items: &[InitItem]) -> String {
        let name = self.new_label();
        let mut values = Vec::new();
        for item in items {
            match item {
                InitItem::Number(n) => values.push(InitValue::Number(*n)),
                InitItem::Str(s) => {
                    for c in s.chars() {
                        values.push(InitValue::Number(c as u32));
                    }
                }
                InitItem::Ref(r) => values.push(InitValue::Ref(r.clone())),
            }
        }
        self.anon_list.push(Symbol::Array {
            name: name.clone(),
            addr: 0,
            size: values.len() as u32,
            elem_size: 1,
            value: Some(values),
        });
        name
    }

    fn collapse_struct(
        &mut self,
        name: &str,
        field: &str,
        left: bool,
    ) -> Result<u8, CompileError> {
        let (base, offset, width) = match self.lookup_sym(name) {
            Some(Symbol::BasedStruct { base, fields, .. }) => {
                match fields.iter().find(|(f, _)| f == field) {
                    Some((_, (offset, width))) => (base, *offset, *width),
                    None => {
                        return Err(self.err(format!(
                            "item {} is not a member of struct {}",
                            field, name
                        )));
                    }
                }
            }
            _ => return Err(self.err(format!("ident {} not a struct", name))),
        };
        let side = if left { "left" } else { "right" };
        self.emit(format!("LHLD {}  ; load struct based {}", base, side), 3);
        if left {
            self.emit(format!("LXI D,{:05X}H", offset), 3);
            self.emit("DAD D     ; struct offset".to_string(), 1);
            self.emit("MOV E,M   ; to (D),E".to_string(), 1);
            if width == 2 {
                self.emit("INX H".to_string(), 1);
                self.emit("MOV D,M".to_string(), 1);
            }
        } else {
            self.emit(format!("LXI B,{:05X}H", offset), 3);
            self.emit("DAD B     ; struct offset".to_string(), 1);
            self.emit("MOV C,M   ; to (B),C".to_string(), 1);
            if width == 2 {
                self.emit("INX H".to_string(), 1);
                self.emit("MOV B,M".to_string(), 1);
            }
        }
        Ok(width)
    }

    // (var := expr): store to var and keep the value live in the
    // requested bank.
    fn collapse_inplace(
        &mut self,
        name: &str,
        value: &Expr,
        left: bool,
    ) -> Result<u8, CompileError> {
        let sym = self
            .lookup_sym(name)
            .filter(|s| s.is_scalar())
            .ok_or_else(|| self.err(format!("inplace assign {} must be a scalar", name)))?;
        let result = sym.scalar_size().unwrap_or(1);
        let width = self.unary_get_arg(value, left)?;
        self.assign_scalar(name, width, false, false)?;
        if !left {
            self.emit("MOV C,E  ; inp assign right".to_string(), 1);
            if width == 2 {
                self.emit("MOV B,D".to_string(), 1);
            }
        }
        self.unary_exit(value, left);
        Ok(result)
    }

    fn collapse_not(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let width = self.unary_get_arg(arg, left)?;
        if width != 1 {
            return Err(self.err("NOT argument BYTE overflow"));
        }
        self.emit("MOV A,E".to_string(), 1);
        let side = if left { "left" } else { "right" };
        self.emit(format!("CMA      ; NOT {}", side), 1);
        self.emit("ANI 001H".to_string(), 2);
        if left {
            self.emit("MOV E,A  ; result to E".to_string(), 1);
        } else {
            self.emit("MOV C,A  ; result to C".to_string(), 1);
        }
        self.unary_exit(arg, left);
        Ok(1)
    }

    // Squeeze a bare element to a 0/1 truth value.
    pub(crate) fn collapse_bool(&mut self, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let width = self.unary_get_arg(arg, left)?;
        if width != 1 {
            return Err(self.err("bool expression BYTE overflow"));
        }
        self.emit("MOV A,E".to_string(), 1);
        self.emit("ANI 001H  ; bool".to_string(), 2);
        if left {
            self.emit("MOV E,A   ; left to E".to_string(), 1);
        } else {
            self.emit("MOV C,A   ; right to C".to_string(), 1);
        }
        self.unary_exit(arg, left);
        Ok(1)
    }

    // ------------- width promotion helpers -------------

    fn pad_left_msb(&mut self) {
        self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
    }

    fn pad_right_msb(&mut self) {
        self.emit("MVI B,000H  ; zero pad MSB".to_string(), 2);
    }

    // ------------- arithmetic and logic -------------

    fn collapse_add(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        let width = lw.max(rw);
        let side = if left { "left" } else { "right" };
        if width == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit(format!("ADD E    ; + {}", side), 1);
            if left {
                self.emit("MOV E,A  ; result to E".to_string(), 1);
            } else {
                self.emit("MOV C,A  ; result to C".to_string(), 1);
            }
        } else {
            if rw == 1 {
                self.pad_right_msb();
            } else if lw == 1 {
                self.pad_left_msb();
            }
            self.emit("XCHG   ; from D,E".to_string(), 1);
            self.emit(format!("DAD B  ; + {}", side), 1);
            if left {
                self.emit("XCHG   ; result to D,E".to_string(), 1);
            } else {
                self.emit("MOV C,L  ; result to B,C".to_string(), 1);
                self.emit("MOV B,H".to_string(), 1);
            }
        }
        Ok(width)
    }

    fn collapse_sub(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        let width = lw.max(rw);
        let side = if left { "left" } else { "right" };
        if width == 1 {
            self.emit("MOV A,E".to_string(), 1);
            self.emit(format!("SUB C    ; - {}", side), 1);
            if left {
                self.emit("MOV E,A  ; result to E".to_string(), 1);
            } else {
                self.emit("MOV C,A  ; result to C".to_string(), 1);
            }
        } else {
            if rw == 1 {
                self.pad_right_msb();
            } else if lw == 1 {
                self.pad_left_msb();
            }
            self.emit("MOV A,E".to_string(), 1);
            self.emit(format!("SUB C    ; - {}", side), 1);
            if left {
                self.emit("MOV E,A".to_string(), 1);
                self.emit("MOV A,D".to_string(), 1);
                self.emit("SBB B".to_string(), 1);
                self.emit("MOV D,A  ; result to D,E".to_string(), 1);
            } else {
                self.emit("MOV C,A".to_string(), 1);
                self.emit("MOV A,D".to_string(), 1);
                self.emit("SBB B".to_string(), 1);
                self.emit("MOV B,A  ; result to B,C".to_string(), 1);
            }
        }
        Ok(width)
    }

    // Shift-and-add: 8 rounds for a byte multiplier, 16 for an address,
    // with the round count parked on the stack in the wide case.
    fn collapse_mul(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if lw == 1 {
            self.pad_left_msb();
        }
        let loop_top = self.new_label();
        let skip_add = self.new_label();
        if rw == 1 {
            self.emit("MVI B,008H  ; * count".to_string(), 2);
        } else {
            self.emit("MVI A,010H  ; * count".to_string(), 2);
        }
        self.emit("LXI H,00000H  ; * init".to_string(), 3);
        self.emit_label(&loop_top);
        if rw == 2 {
            self.emit("PUSH PSW  ; * save count".to_string(), 1);
            self.emit("MOV A,B".to_string(), 1);
            self.emit("RAR".to_string(), 1);
            self.emit("MOV B,A".to_string(), 1);
        }
        self.emit("MOV A,C".to_string(), 1);
        self.emit("RAR".to_string(), 1);
        self.emit("MOV C,A".to_string(), 1);
        self.emit(format!("JNC {}  ; * check bits of right arg", skip_add), 3);
        self.emit("DAD D".to_string(), 1);
        self.emit_label(&skip_add);
        self.emit("XCHG".to_string(), 1);
        self.emit("DAD H".to_string(), 1);
        self.emit("XCHG".to_string(), 1);
        if rw == 1 {
            self.emit("DCR B  ; check count".to_string(), 1);
        } else {
            self.emit("POP PSW ;  * check count".to_string(), 1);
            self.emit("DCR A".to_string(), 1);
        }
        self.emit(format!("JNZ {} ;  * more bits", loop_top), 3);
        if left {
            self.emit("XCHG  ; * result to D,E".to_string(), 1);
        } else {
            self.emit("MOV C,L  ; * result to B,C".to_string(), 1);
            self.emit("MOV B,H".to_string(), 1);
        }
        Ok(2)
    }

    // Restoring division: quotient accumulates in HL.
    fn collapse_div(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if rw == 1 {
            self.pad_right_msb();
        }
        if lw == 1 {
            self.pad_left_msb();
        }
        let loop_top = self.new_label();
        let done = self.new_label();
        self.emit("LXI H,00000H  ; / init".to_string(), 3);
        self.emit_label(&loop_top);
        self.emit("MOV A,E".to_string(), 1);
        self.emit("SUB C".to_string(), 1);
        self.emit("MOV E,A".to_string(), 1);
        self.emit("MOV A,D".to_string(), 1);
        self.emit("SBB B".to_string(), 1);
        self.emit(format!("JC {}  ; / complete", done), 3);
        self.emit("MOV D,A".to_string(), 1);
        self.emit("INX H".to_string(), 1);
        self.emit(format!("JMP {}  ; more /", loop_top), 3);
        self.emit_label(&done);
        if left {
            self.emit("XCHG  ; / result to D,E".to_string(), 1);
        } else {
            self.emit("MOV C,L  ; / result to B,C".to_string(), 1);
            self.emit("MOV B,H".to_string(), 1);
        }
        Ok(2)
    }

    // Repeated subtraction; the first non-borrowing remainder wins.
    fn collapse_mod(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        if lw == 1 {
            self.pad_left_msb();
        }
        if rw == 1 {
            self.pad_right_msb();
        }
        let loop_top = self.new_label();
        self.emit_label(&loop_top);
        self.emit("MOV A,E".to_string(), 1);
        self.emit("SUB C".to_string(), 1);
        self.emit("MOV E,A".to_string(), 1);
        self.emit("MOV A,D".to_string(), 1);
        self.emit("SBB B".to_string(), 1);
        self.emit("MOV D,A".to_string(), 1);
        self.emit(format!("JNC {}  ; more MOD", loop_top), 3);
        self.emit("XCHG".to_string(), 1);
        self.emit("DAD B".to_string(), 1);
        if left {
            self.emit("XCHG  ; MOD left to D,E".to_string(), 1);
        } else {
            self.emit("MOV C,L".to_string(), 1);
            self.emit("MOV B,H  ; MOD right to B,C".to_string(), 1);
        }
        Ok(2)
    }

    fn collapse_and(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        let width = lw.max(rw);
        let side = if left { "left" } else { "right" };
        if width == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit(format!("ANA E    ; & {}", side), 1);
            if left {
                self.emit("MOV E,A  ; result to E".to_string(), 1);
            } else {
                self.emit("MOV C,A  ; result to C".to_string(), 1);
            }
        } else {
            if rw == 1 {
                self.pad_right_msb();
            } else if lw == 1 {
                self.pad_left_msb();
            }
            self.emit("MOV A,C".to_string(), 1);
            self.emit(format!("ANA E    ; & {}", side), 1);
            if left {
                self.emit("MOV E,A".to_string(), 1);
                self.emit("MOV A,B".to_string(), 1);
                self.emit("ANA D".to_string(), 1);
                self.emit("MOV D,A  ; result to D,E".to_string(), 1);
            } else {
                self.emit("MOV C,A".to_string(), 1);
                self.emit("MOV A,B".to_string(), 1);
                self.emit("ANA D".to_string(), 1);
                self.emit("MOV B,A  ; result to B,C".to_string(), 1);
            }
        }
        Ok(width)
    }

    fn collapse_or(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let (lw, rw) = self.get_args(a, b)?;
        let width = lw.max(rw);
        let side = if left { "left" } else { "right" };
        if width == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit(format!("ORA E    ; | {}", side), 1);
            if left {
                self.emit("MOV E,A  ; result to E".to_string(), 1);
            } else {
                self.emit("MOV C,A  ; result to C".to_string(), 1);
            }
        } else {
            if rw == 1 {
                self.pad_right_msb();
            } else if lw == 1 {
                self.pad_left_msb();
            }
            self.emit("MOV A,C".to_string(), 1);
            self.emit(format!("ORA E    ; | {}", side), 1);
            if left {
                self.emit("MOV E,A".to_string(), 1);
                self.emit("MOV A,B".to_string(), 1);
                self.emit("ORA D".to_string(), 1);
                self.emit("MOV D,A  ; result to D,E".to_string(), 1);
            } else {
                self.emit("MOV C,A".to_string(), 1);
                self.emit("MOV A,B".to_string(), 1);
                self.emit("ORA D".to_string(), 1);
                self.emit("MOV B,A  ; result to B,C".to_string(), 1);
            }
        }
        Ok(width)
    }

    // ------------- relationals -------------

    // All relationals settle to a BYTE 0/1 through a shared tail: the
    // true path loads 1 and jumps past the false path's 0.
    fn rel_tail(&mut self, left: bool, false_label: &str, join: &str) {
        if left {
            self.emit("MVI E,001H  ; rel true left".to_string(), 2);
        } else {
            self.emit("MVI C,001H  ; rel true right".to_string(), 2);
        }
        self.emit(format!("JMP {}", join), 3);
        self.emit_label(false_label);
        if left {
            self.emit("MVI E,000H  ; rel false left".to_string(), 2);
        } else {
            self.emit("MVI C,000H  ; rel false right".to_string(), 2);
        }
        self.emit_label(join);
    }

    fn rel_pads(&mut self, lw: u8, rw: u8) {
        if lw == 1 {
            self.pad_left_msb();
        } else if rw == 1 {
            self.pad_right_msb();
        }
    }

    fn collapse_eq(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let (lw, rw) = self.get_args(a, b)?;
        if lw.max(rw) == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E ; =".to_string(), 1);
            self.emit(format!("JNZ {} ; !=", false_label), 3);
        } else {
            self.rel_pads(lw, rw);
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E  ; =".to_string(), 1);
            self.emit(format!("JNZ {} ; !=", false_label), 3);
            self.emit("MOV A,B".to_string(), 1);
            self.emit("CMP D  ; =".to_string(), 1);
            self.emit(format!("JNZ {} ; !=", false_label), 3);
        }
        self.rel_tail(left, &false_label, &join);
        Ok(1)
    }

    fn collapse_ne(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let (lw, rw) = self.get_args(a, b)?;
        if lw.max(rw) == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E ; <>".to_string(), 1);
            self.emit(format!("JZ {} ; =", false_label), 3);
        } else {
            let high_equal = self.new_label();
            let taken = self.new_label();
            self.rel_pads(lw, rw);
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E  ; <>".to_string(), 1);
            self.emit(format!("JZ {}  ; =", high_equal), 3);
            self.emit(format!("JMP {} ; !=", taken), 3);
            self.emit_label(&high_equal);
            self.emit("MOV A,B".to_string(), 1);
            self.emit("CMP D  ; <>".to_string(), 1);
            self.emit(format!("JZ {} ; =", false_label), 3);
            self.emit_label(&taken);
        }
        self.rel_tail(left, &false_label, &join);
        Ok(1)
    }

    fn collapse_lt(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let (lw, rw) = self.get_args(a, b)?;
        if lw.max(rw) == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E  ; <".to_string(), 1);
            self.emit(format!("JC {}", false_label), 3);
            self.emit(format!("JZ {}", false_label), 3);
        } else {
            let high_equal = self.new_label();
            let taken = self.new_label();
            self.rel_pads(lw, rw);
            self.emit("MOV A,D".to_string(), 1);
            self.emit("CMP B  ; <".to_string(), 1);
            self.emit(format!("JZ {}   ; =", high_equal), 3);
            self.emit(format!("JNC {}  ; >", false_label), 3);
            self.emit(format!("JMP {}  ; <", taken), 3);
            self.emit_label(&high_equal);
            self.emit("MOV A,E".to_string(), 1);
            self.emit("CMP C  ; <".to_string(), 1);
            self.emit(format!("JNC {} ; >=", false_label), 3);
            self.emit_label(&taken);
        }
        self.rel_tail(left, &false_label, &join);
        Ok(1)
    }

    fn collapse_gt(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let (lw, rw) = self.get_args(a, b)?;
        if lw.max(rw) == 1 {
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E  ; >".to_string(), 1);
            self.emit(format!("JNC {}", false_label), 3);
        } else {
            let high_equal = self.new_label();
            let taken = self.new_label();
            self.rel_pads(lw, rw);
            self.emit("MOV A,D".to_string(), 1);
            self.emit("CMP B   ; >".to_string(), 1);
            self.emit(format!("JC {}   ; <", false_label), 3);
            self.emit(format!("JZ {}   ; =", high_equal), 3);
            self.emit(format!("JMP {}  ; >", taken), 3);
            self.emit_label(&high_equal);
            self.emit("MOV A,E".to_string(), 1);
            self.emit("CMP C  ; >".to_string(), 1);
            self.emit(format!("JC {}  ; <", false_label), 3);
            self.emit(format!("JZ {}  ; =", false_label), 3);
            self.emit_label(&taken);
        }
        self.rel_tail(left, &false_label, &join);
        Ok(1)
    }

    fn collapse_le(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let (lw, rw) = self.get_args(a, b)?;
        if lw.max(rw) == 1 {
            let taken = self.new_label();
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E   ; <=".to_string(), 1);
            self.emit(format!("JC {}", false_label), 3);
            self.emit_label(&taken);
        } else {
            let high_equal = self.new_label();
            let taken = self.new_label();
            self.rel_pads(lw, rw);
            self.emit("MOV A,D".to_string(), 1);
            self.emit("CMP B  ; <=".to_string(), 1);
            self.emit(format!("JZ {} ; =", high_equal), 3);
            self.emit(format!("JNC {}  ; >", false_label), 3);
            self.emit(format!("JMP {}  ; <", taken), 3);
            self.emit_label(&high_equal);
            self.emit("MOV A,E".to_string(), 1);
            self.emit("CMP C  ; <=".to_string(), 1);
            self.emit(format!("JZ {}  ; =", taken), 3);
            self.emit(format!("JNC {}  ; >", false_label), 3);
            self.emit_label(&taken);
        }
        self.rel_tail(left, &false_label, &join);
        Ok(1)
    }

    fn collapse_ge(&mut self, a: &Expr, b: &Expr, left: bool) -> Result<u8, CompileError> {
        let false_label = self.new_label();
        let join = self.new_label();
        let (lw, rw) = self.get_args(a, b)?;
        if lw.max(rw) == 1 {
            let taken = self.new_label();
            self.emit("MOV A,C".to_string(), 1);
            self.emit("CMP E  ; >=".to_string(), 1);
            self.emit(format!("JZ {}   ; =", taken), 3);
            self.emit(format!("JNC {}", false_label), 3);
            self.emit_label(&taken);
        } else {
            let high_equal = self.new_label();
            let taken = self.new_label();
            self.rel_pads(lw, rw);
            self.emit("MOV A,D".to_string(), 1);
            self.emit("CMP B  ; >=".to_string(), 1);
            self.emit(format!("JZ {}  ; =", high_equal), 3);
            self.emit(format!("JC {}  ; <", false_label), 3);
            self.emit(format!("JMP {} ; >", taken), 3);
            self.emit_label(&high_equal);
            self.emit("MOV A,E".to_string(), 1);
            self.emit("CMP C  ; >=".to_string(), 1);
            self.emit(format!("JC {}  ; <", false_label), 3);
            self.emit_label(&taken);
        }
        self.rel_tail(left, &false_label, &join);
        Ok(1)
    }

    // ------------- procedure calls -------------

    fn resolve_call(&self, name: &str, num_args: usize) -> Result<Procedure, CompileError> {
        let proc = match self.lookup(name) {
            Some(Resolved::Proc(proc)) => proc,
            _ => return Err(self.err(format!("unknown procedure {}", name))),
        };
        if proc.num_args() != num_args {
            return Err(self.err(format!(
                "procedure {} takes {} arguments",
                name,
                proc.num_args()
            )));
        }
        Ok(proc)
    }

    fn call_tail(&mut self, ret_size: u8, left: bool) {
        if !left && ret_size > 0 {
            self.emit("MOV C,E  ; proc ret right to (B),C".to_string(), 1);
            if ret_size == 2 {
                self.emit("MOV B,D".to_string(), 1);
            }
        }
    }

    fn arg_width(
        &self,
        proc: &Procedure,
        index: usize,
    ) -> Result<u8, CompileError> {
        let widths = proc.info().map(|i| i.arg_widths.as_slice()).unwrap_or(&[]);
        widths
            .get(index)
            .copied()
            .flatten()
            .ok_or_else(|| {
                self.err(format!(
                    "procedure {} argument {} has unknown width",
                    proc.name(),
                    index + 1
                ))
            })
    }

    pub(crate) fn call0(&mut self, name: &str, left: bool) -> Result<u8, CompileError> {
        let proc = self.resolve_call(name, 0)?;
        self.emit(format!("CALL {}  ; proc call", proc.name()), 3);
        self.call_tail(proc.ret_size(), left);
        Ok(proc.ret_size())
    }

    // CALL through a 2-byte scalar: push a return label, fetch the
    // target address, PCHL into it.
    pub(crate) fn call_addr(&mut self, name: &str) -> Result<u8, CompileError> {
        let sym = self
            .lookup_sym(name)
            .ok_or_else(|| self.err(format!("unknown variable {}", name)))?;
        let ret = self.new_label();
        self.emit(format!("LXI H,{} ; proc ret", ret), 3);
        self.emit("PUSH H".to_string(), 1);
        self.emit(format!("LHLD {}  ; proc address", sym.name()), 3);
        self.emit("PCHL     ; proc call".to_string(), 1);
        self.emit_label(&ret);
        Ok(0)
    }

    pub(crate) fn call1(&mut self, name: &str, arg: &Expr, left: bool) -> Result<u8, CompileError> {
        let proc = self.resolve_call(name, 1)?;
        if let Procedure::Builtin { kind, .. } = proc {
            return self.builtin_call1(kind, arg, left);
        }
        let arg_width = self.unary_get_arg(arg, left)?;
        let want = self.arg_width(&proc, 0)?;
        if arg_width > want {
            return Err(self.err(format!(
                "argument overflow for procedure {} arg 1",
                proc.name()
            )));
        }
        if arg_width < want {
            self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
        }
        self.emit(format!("CALL {}  ; proc call", proc.name()), 3);
        self.call_tail(proc.ret_size(), left);
        self.unary_exit(arg, left);
        Ok(proc.ret_size())
    }

    pub(crate) fn call2(
        &mut self,
        name: &str,
        a: &Expr,
        b: &Expr,
        left: bool,
    ) -> Result<u8, CompileError> {
        let proc = self.resolve_call(name, 2)?;
        if let Procedure::Builtin { kind, .. } = proc {
            return self.builtin_call2(kind, a, b, left);
        }
        let (lw, rw) = self.get_args(a, b)?;
        let want0 = self.arg_width(&proc, 0)?;
        let want1 = self.arg_width(&proc, 1)?;
        if lw > want0 {
            return Err(self.err(format!(
                "argument overflow for procedure {} arg 1",
                proc.name()
            )));
        }
        if rw > want1 {
            return Err(self.err(format!(
                "argument overflow for procedure {} arg 2",
                proc.name()
            )));
        }
        if lw < want0 {
            self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
        }
        if rw < want1 {
            self.emit("MVI B,000H  ; zero pad MSB".to_string(), 2);
        }
        self.emit(format!("CALL {}  ; proc call", proc.name()), 3);
        self.call_tail(proc.ret_size(), left);
        Ok(proc.ret_size())
    }

    // Calls with three or more arguments: the extra arguments are
    // evaluated first and pushed, the first two ride the register
    // banks, and the pushed slots are discarded after the call.
    pub(crate) fn call_ext(
        &mut self,
        name: &str,
        args: &[Expr],
        left: bool,
    ) -> Result<u8, CompileError> {
        let proc = self.resolve_call(name, args.len())?;
        for (n, arg) in args[2..].iter().enumerate() {
            let arg_width = self.collapse_left(arg)?;
            let want = self.arg_width(&proc, n + 2)?;
            if arg_width > want {
                return Err(self.err(format!(
                    "argument overflow for procedure {} arg {}",
                    proc.name(),
                    n + 3
                )));
            }
            if arg_width < want {
                self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
            }
            self.emit("PUSH D  ; proc ext arg".to_string(), 1);
        }

        let (lw, rw) = self.get_args(&args[0], &args[1])?;
        let want0 = self.arg_width(&proc, 0)?;
        let want1 = self.arg_width(&proc, 1)?;
        if lw > want0 {
            return Err(self.err(format!(
                "argument overflow for procedure {} arg 1",
                proc.name()
            )));
        }
        if rw > want1 {
            return Err(self.err(format!(
                "argument overflow for procedure {} arg 2",
                proc.name()
            )));
        }
        if lw < want0 {
            self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
        }
        if rw < want1 {
            self.emit("MVI B,000H  ; zero pad MSB".to_string(), 2);
        }
        self.emit(format!("CALL {}  ; proc call", proc.name()), 3);
        self.call_tail(proc.ret_size(), left);
        for _ in 2..args.len() {
            self.emit("POP H  ; proc ext arg discard".to_string(), 1);
        }
        Ok(proc.ret_size())
    }
}
