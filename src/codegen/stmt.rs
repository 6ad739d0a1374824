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

use super::flow::{CaseInfo, DoFrame};
use super::optimizer::get_instr;
use super::symbol::Symbol;
use super::{Codegen, Resolved};
use crate::ast::{AssignTarget, Expr, Statement, StmtKind};
use crate::errors::CompileError;

// Statement result values, used to fold an IF skip label into the DO
// frame pushed by its THEN body: plain DO yields 1, IF-THEN-DO 2.
const STMT_PLAIN: i32 = 0;
const STMT_DO: i32 = 1;
const STMT_IF_DO: i32 = 2;

impl Codegen {
    pub(crate) fn gen_statement(&mut self, stmt: &Statement) -> Result<i32, CompileError> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Declare(items) => {
                for decl in items {
                    self.gen_declaration(decl)?;
                }
                self.end_declare();
                Ok(STMT_PLAIN)
            }
            StmtKind::ProcDecl {
                name,
                args,
                ret,
                external,
            } => {
                let ret_size = ret.map(|t| t.width()).unwrap_or(0);
                self.gen_proc_decl(name, args, ret_size, *external)?;
                self.end_declare();
                Ok(STMT_PLAIN)
            }
            StmtKind::EndProc { name } => {
                self.gen_end_proc(name)?;
                self.end_declare();
                Ok(STMT_PLAIN)
            }
            StmtKind::Label(name) => {
                if self.lookup(name).is_some()
                    || self.sym_list.iter().any(|s| s.is_label() && s.name() == name)
                {
                    return Err(self.err(format!("name {} already defined", name)));
                }
                self.emit_label(name);
                Ok(STMT_PLAIN)
            }
            _ => self.gen_code_statement(stmt),
        }
    }

    // Declarations close any executable run; the next executable
    // statement re-opens one (and triggers the procedure prologue).
    fn end_declare(&mut self) {
        self.exec_state = false;
        self.mark_statement();
    }

    // Wrapper applied to every executable statement after its own code
    // is generated: the procedure prologue splice on the first one, and
    // the per-child label and END jump inside an open DO CASE.
    pub(crate) fn gen_code_statement(&mut self, stmt: &Statement) -> Result<i32, CompileError> {
        let value = self.gen_exec_statement(stmt)?;
        self.line = stmt.line;

        if !self.exec_state {
            self.exec_state = true;
            if !self.proc_stack.is_empty() {
                self.emit_proc()?;
            }
        }

        if self.case_flag {
            self.case_child();
        }

        Ok(value)
    }

    fn case_child(&mut self) {
        let Some(info) = self.case_list.last_mut() else {
            return;
        };
        if info.first {
            info.first = false;
            return;
        }
        let label = self.new_label();
        let es = self.pop_statement();
        let end = match self.case_list.last_mut() {
            Some(info) => {
                info.labels.push(label.clone());
                info.labels[0].clone()
            }
            None => return,
        };
        self.emit_label(&label);
        self.replay(es, 0);
        self.emit(format!("JMP {}  ; end CASE", end), 3);
    }

    fn gen_exec_statement(&mut self, stmt: &Statement) -> Result<i32, CompileError> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Do => {
                self.mark_statement();
                self.do_stack.push(None);
                Ok(STMT_DO)
            }
            StmtKind::DoWhile(cond) => self.gen_do_while(cond),
            StmtKind::DoCase(selector) => self.gen_do_case(selector),
            StmtKind::DoTo { var, from, to, by } => self.gen_do_to(var, from, to, by.as_ref()),
            StmtKind::End => self.gen_end(),
            StmtKind::Goto(target) => {
                self.mark_statement();
                self.emit(format!("JMP {}  ; GO TO", target), 3);
                Ok(STMT_PLAIN)
            }
            StmtKind::Call { name, args } => self.gen_call(name, args),
            StmtKind::Return(value) => self.gen_return(value.as_ref()),
            StmtKind::Assign { targets, value } => self.gen_assign(targets, value),
            StmtKind::If { cond, body } => self.gen_if(cond, body),
            StmtKind::Else { body } => self.gen_else(body),
            _ => Ok(STMT_PLAIN),
        }
    }

    fn gen_do_while(&mut self, cond: &Expr) -> Result<i32, CompileError> {
        self.mark_statement();
        let top = self.new_label();
        let exit = self.new_label();
        self.emit_label(&top);
        self.collapse_condition(cond)?;
        self.emit("XRA A  ; A = 0".to_string(), 1);
        self.emit("CMP E  ; rel result".to_string(), 1);
        self.emit(format!("JZ {}  ; skip while", exit), 3);
        self.do_stack.push(Some(DoFrame::looping(exit, top)));
        Ok(STMT_PLAIN)
    }

    // Jump-table dispatch: index scaled to words, target fetched from
    // the table emitted after the code, entered through PCHL.
    fn gen_do_case(&mut self, selector: &Expr) -> Result<i32, CompileError> {
        self.mark_statement();
        let table = self.new_label();
        let exit = self.new_label();
        let width = self.collapse_left(selector)?;
        if width == 1 {
            self.emit("MVI D,000H  ; zero pad CASE MSB".to_string(), 2);
        }
        self.emit(format!("LXI H,{}  ; CASE table", table), 3);
        self.emit("XCHG".to_string(), 1);
        self.emit("DAD H  ; index << 1".to_string(), 1);
        self.emit("DAD D  ; CASE table offset".to_string(), 1);
        self.emit("MOV E,M".to_string(), 1);
        self.emit("INX H".to_string(), 1);
        self.emit("MOV D,M".to_string(), 1);
        self.emit("XCHG".to_string(), 1);
        self.emit("PCHL  ; go to CASE".to_string(), 1);
        self.do_stack.push(Some(DoFrame::exit(exit.clone())));
        self.case_flag = true;
        self.case_list.push(CaseInfo {
            table,
            first: true,
            labels: vec![exit],
        });
        Ok(STMT_PLAIN)
    }

    fn gen_do_to(
        &mut self,
        var: &str,
        from: &Expr,
        to: &Expr,
        by: Option<&Expr>,
    ) -> Result<i32, CompileError> {
        let sym = match self.lookup(var) {
            Some(Resolved::Sym(sym)) => sym,
            _ => return Err(self.err(format!("unknown identifier {}", var))),
        };
        let size = match &sym {
            Symbol::Variable { size, .. } => *size,
            _ => return Err(self.err(format!("DO variable {} must be scalar", var))),
        };
        let name = sym.name().to_string();

        self.mark_statement();
        let top = self.new_label();
        let exit = self.new_label();
        let assign = self.new_label();

        let from_width = self.collapse_left(from)?;
        if from_width > size {
            return Err(self.err(format!("DO variable {} overflow", var)));
        }
        if size == 1 {
            self.emit("MOV A,E".to_string(), 1);
        } else {
            if from_width == 1 {
                self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
            }
            self.emit("XCHG     ; from D,E".to_string(), 1);
        }
        self.emit(format!("JMP {}  ; DO first iter", assign), 3);

        self.emit_label(&top);
        let to_width = self.collapse_left(to)?;
        if to_width > size {
            return Err(self.err(format!("DO variable {} overflow", var)));
        }

        let by_const = match by {
            Some(Expr::Number(n)) => Some(*n),
            _ => None,
        };
        let by_expr = by.filter(|_| by_const.is_none());
        let mut by_width = 0u8;
        if let Some(step) = by_expr {
            let save_left = self.expr_is_operator(step);
            if save_left {
                self.emit("PUSH D  ; save left DO".to_string(), 1);
            }
            by_width = self.collapse_right(step)?;
            if by_width > size {
                return Err(self.err(format!("DO variable {} overflow", var)));
            }
            if save_left {
                self.emit("POP D  ; restore left DO".to_string(), 1);
            }
        }

        if size == 1 {
            self.emit(format!("LDA {}  ; DO load", name), 3);
            if by.is_some() {
                if by_expr.is_some() {
                    self.emit("ADD C  ; DO update".to_string(), 1);
                } else {
                    self.emit(
                        format!("ADI {:03X}H  ; DO update", by_const.unwrap_or(1)),
                        2,
                    );
                }
            } else {
                self.emit("INR A   ; DO update".to_string(), 1);
            }
            self.emit("CMP E   ; DO <=".to_string(), 1);
            self.emit(format!("JZ {}   ; =", assign), 3);
            self.emit(format!("JNC {}  ; > DO complete", exit), 3);
        } else {
            let low_check = self.new_label();
            if by_expr.is_some() && by_width == 1 {
                self.emit("MVI B,000H  ; zero pad MSB".to_string(), 2);
            }
            if to_width == 1 {
                self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
            }
            self.emit(format!("LHLD {}  ; DO load", name), 3);
            if by.is_some() {
                if by_expr.is_some() {
                    self.emit("DAD B  ; DO update".to_string(), 1);
                } else {
                    self.emit(format!("LXI B,{:05X}H", by_const.unwrap_or(1)), 3);
                    self.emit("DAD B  ; DO update".to_string(), 1);
                }
            } else {
                self.emit("INX H    ; DO update".to_string(), 1);
            }
            self.emit("MOV A,H".to_string(), 1);
            self.emit("CMP D   ; DO <=".to_string(), 1);
            self.emit(format!("JZ {}   ; =", low_check), 3);
            self.emit(format!("JNC {}  ; > DO complete", exit), 3);
            self.emit(format!("JMP {}  ; <", assign), 3);
            self.emit_label(&low_check);
            self.emit("MOV A,L".to_string(), 1);
            self.emit("CMP E   ; DO <=".to_string(), 1);
            self.emit(format!("JZ {}   ; =", assign), 3);
            self.emit(format!("JNC {}  ; > DO complete", exit), 3);
        }

        self.emit_label(&assign);
        if size == 1 {
            self.emit(format!("STA {}  ; DO assign", name), 3);
        } else {
            self.emit(format!("SHLD {}  ; DO assign", name), 3);
        }
        self.do_stack.push(Some(DoFrame::looping(exit, top)));
        Ok(STMT_PLAIN)
    }

    fn gen_end(&mut self) -> Result<i32, CompileError> {
        let frame = match self.do_stack.pop() {
            Some(frame) => frame,
            None => return Err(self.err("unmatched END")),
        };
        self.mark_statement();
        if let Some(frame) = frame {
            if let Some(top) = frame.top {
                self.emit(format!("JMP {}  ; END", top), 3);
            }
            for label in frame.exits {
                self.emit_label(&label);
            }
        }
        if self.case_flag {
            self.case_flag = false;
        }
        Ok(STMT_PLAIN)
    }

    pub(crate) fn gen_end_proc(&mut self, name: &str) -> Result<(), CompileError> {
        let top = match self.proc_stack.pop() {
            Some(top) => top,
            None => return Err(self.err("unmatched END")),
        };
        if name != top {
            return Err(self.err("unmatched END"));
        }
        let proc = self
            .find_proc(&top)
            .cloned()
            .ok_or_else(|| self.err(format!("unknown proc {}", top)))?;
        if !proc.is_external() {
            if !self.ret_seen && proc.ret_size() != 0 {
                return Err(self.err(format!("proc {} missing RETURN", top)));
            }
            if !self.ends_with_ret() {
                self.emit("RET  ; proc return".to_string(), 1);
            }
        }
        self.ret_seen = false;
        Ok(())
    }

    fn gen_call(&mut self, name: &str, args: &[Expr]) -> Result<i32, CompileError> {
        let target = self
            .lookup(name)
            .ok_or_else(|| self.err(format!("unknown proc {}", name)))?;
        self.mark_statement();

        if args.is_empty() {
            match target {
                Resolved::Proc(proc) => {
                    if proc.num_args() != 0 {
                        return Err(self.err(format!(
                            "proc {} requires {} args",
                            name,
                            proc.num_args()
                        )));
                    }
                    self.call0(name, true)?;
                }
                Resolved::Sym(sym) => {
                    // CALL through a 2-byte scalar is an indirect call.
                    if sym.scalar_size() != Some(2) {
                        return Err(self.err(format!("called variable {} must be address", name)));
                    }
                    self.call_addr(name)?;
                }
            }
            return Ok(STMT_PLAIN);
        }

        let proc = match target {
            Resolved::Proc(proc) => proc,
            Resolved::Sym(_) => {
                return Err(self.err(format!("ident {} not a procedure", name)));
            }
        };
        if proc.num_args() != args.len() {
            return Err(self.err(format!("proc {} requires {} args", name, proc.num_args())));
        }
        match args {
            [a] => self.call1(name, a, true)?,
            [a, b] => self.call2(name, a, b, true)?,
            _ => self.call_ext(name, args, true)?,
        };
        Ok(STMT_PLAIN)
    }

    fn gen_return(&mut self, value: Option<&Expr>) -> Result<i32, CompileError> {
        if self.proc_stack.is_empty() {
            return Err(self.err("return not allowed outside proc"));
        }
        self.mark_statement();
        if let Some(expr) = value {
            let current = self.proc_stack.last().cloned().unwrap_or_default();
            let ret_size = self
                .find_proc(&current)
                .map(|p| p.ret_size())
                .unwrap_or(0);
            let width = self.collapse_left(expr)?;
            if width == 0 {
                return Err(self.err("procedure does not return a value"));
            }
            if width > ret_size {
                return Err(self.err("return overflow"));
            }
            if width < ret_size {
                self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
            }
        }
        self.emit("RET  ; proc return".to_string(), 1);
        self.ret_seen = true;
        Ok(STMT_PLAIN)
    }

    fn gen_assign(
        &mut self,
        targets: &[AssignTarget],
        value: &Expr,
    ) -> Result<i32, CompileError> {
        for target in targets {
            let name = match target {
                AssignTarget::Scalar(name) | AssignTarget::Element(name, _) => name,
            };
            if self.lookup(name).is_none() {
                return Err(self.err(format!("unknown identifier {}", name)));
            }
        }
        self.mark_statement();
        let width = self.collapse_left(value)?;
        let mut pad = false;
        for (n, target) in targets.iter().enumerate() {
            match target {
                AssignTarget::Element(name, index) => {
                    pad = self.assign_array(name, index, width, pad)?;
                }
                AssignTarget::Scalar(name) => {
                    pad = self.assign_scalar(name, width, n == targets.len() - 1, pad)?;
                }
            }
        }
        Ok(STMT_PLAIN)
    }

    // Store the value held in (D),E into one element of an array
    // target. DE is parked on the stack while the index is computed.
    fn assign_array(
        &mut self,
        name: &str,
        index: &Expr,
        width: u8,
        mut pad: bool,
    ) -> Result<bool, CompileError> {
        let sym = self
            .lookup_sym(name)
            .filter(|s| s.is_array())
            .ok_or_else(|| self.err(format!("target {} not an array", name)))?;
        let elem_size = sym.elem_size().unwrap_or(1);
        let num_elements = sym.array_size().unwrap_or(0) / elem_size as u32;
        if let Expr::Number(n) = index
            && num_elements != 0
            && *n > num_elements - 1
        {
            self.warn(format!("array {} index {} overflow", name, n));
        }
        if elem_size < width {
            self.warn(format!("BYTE array element overflow {}", name));
        }
        if elem_size > width && !pad {
            pad = true;
            self.emit("MVI D,000H  ; zero pad elem MSB".to_string(), 2);
        }
        self.emit("PUSH D  ; save left array".to_string(), 1);
        let index_width = self.collapse_left(index)?;
        if index_width == 1 {
            self.emit("MVI D,000H  ; zero pad index MSB".to_string(), 2);
        }
        match &sym {
            Symbol::BasedArray { base, .. } => {
                self.emit(format!("LHLD {}  ; store arr based", base), 3);
            }
            Symbol::AtArray { target, .. } => {
                self.emit(format!("LXI H,{}  ; store arr", Self::at_base(target)), 3);
            }
            _ => {
                self.emit(format!("LXI H,{}  ; store arr", sym.name()), 3);
            }
        }
        if elem_size == 2 {
            self.emit("XCHG".to_string(), 1);
            self.emit("DAD H  ; index << 1".to_string(), 1);
        }
        self.emit("DAD D  ; arr offset".to_string(), 1);
        self.emit("POP D  ; arr restore left".to_string(), 1);
        self.emit("MOV M,E  ; arr assign from (D),E".to_string(), 1);
        if elem_size == 2 {
            self.emit("INX H".to_string(), 1);
            self.emit("MOV M,D".to_string(), 1);
        }
        Ok(pad)
    }

    pub(crate) fn assign_scalar(
        &mut self,
        name: &str,
        width: u8,
        last: bool,
        mut pad: bool,
    ) -> Result<bool, CompileError> {
        let sym = self
            .lookup_sym(name)
            .filter(|s| s.is_scalar())
            .ok_or_else(|| self.err(format!("cannot assign to {}", name)))?;
        let size = sym.scalar_size().unwrap_or(1);
        if size == 1 {
            if width != 1 {
                self.warn(format!("BYTE variable overflow {}", sym.name()));
            }
            match &sym {
                Symbol::BasedVariable { base, .. } => {
                    self.emit(format!("LHLD {}  ; assign based", base), 3);
                }
                Symbol::AtVariable { target, offset, .. } => {
                    let dest = Self::at_name(target, *offset);
                    self.emit(format!("LXI H,{}   ; assign", dest), 3);
                }
                _ => {
                    self.emit(format!("LXI H,{}   ; assign", sym.name()), 3);
                }
            }
            self.emit("MOV M,E    ; from E".to_string(), 1);
        } else {
            if width == 1 && !pad {
                pad = true;
                self.emit("MVI D,000H  ; zero pad MSB".to_string(), 2);
            }
            match &sym {
                Symbol::BasedVariable { base, .. } => {
                    self.emit(format!("LHLD {}  ; assign based", base), 3);
                    self.emit("MOV M,E".to_string(), 1);
                    self.emit("INX H".to_string(), 1);
                    self.emit("MOV M,D  ; from D,E".to_string(), 1);
                }
                _ => {
                    self.emit("XCHG    ; from D,E".to_string(), 1);
                    if sym.name() == "STACKPTR" {
                        self.emit("SPHL  ; assign STACKPTR".to_string(), 1);
                    } else {
                        let dest = match &sym {
                            Symbol::AtVariable { target, offset, .. } => {
                                Self::at_name(target, *offset)
                            }
                            _ => sym.name().to_string(),
                        };
                        self.emit(format!("SHLD {} ; assign", dest), 3);
                    }
                    if !last {
                        self.emit("XCHG    ; restore D,E".to_string(), 1);
                    }
                }
            }
        }
        Ok(pad)
    }

    // Generate the THEN body first, then splice the condition test in
    // front of it, shifting the body past the spliced bytes. When the
    // body opened a plain DO, the skip label folds into its frame so
    // the matching END emits it.
    fn gen_if(&mut self, cond: &Expr, body: &Statement) -> Result<i32, CompileError> {
        let body_value = self.gen_code_statement(body)?;
        let es = self.pop_statement();
        let old_pc = self.pc;
        self.mark_statement();
        self.collapse_condition(cond)?;
        let skip = self.new_label();
        self.emit("XRA A  ; A = 0".to_string(), 1);
        self.emit("CMP E  ; rel result".to_string(), 1);
        self.emit(format!("JZ {}  ; skip if", skip), 3);
        self.emit_code();
        let size = self.pc - old_pc;
        self.replay(es, size);
        if body_value > 0 {
            let old = self.do_stack.pop().flatten();
            let mut exits = vec![skip];
            if let Some(frame) = old {
                exits.extend(frame.exits);
            }
            self.do_stack.push(Some(DoFrame { exits, top: None }));
            Ok(STMT_IF_DO)
        } else {
            self.emit_label(&skip);
            Ok(STMT_PLAIN)
        }
    }

    // The ELSE body was generated right after the IF's skip label; pull
    // the label back out, place a join jump before it, and shift the
    // body past the jump.
    fn gen_else(&mut self, body: &Statement) -> Result<i32, CompileError> {
        let body_value = self.gen_code_statement(body)?;
        let es = self.pop_statement();
        let join = self.new_label();
        let have_label = self.sym_list.len() > self.pseudo_count
            && matches!(self.sym_list.last(), Some(Symbol::Label { .. }));
        if !have_label {
            return Err(self.err("unmatched ELSE"));
        }
        let skip = match self.sym_list.pop() {
            Some(Symbol::Label { name, .. }) => name,
            _ => return Err(self.err("unmatched ELSE")),
        };
        self.emit(format!("JMP {}  ; skip else", join), 3);
        self.emit_label(&skip);
        self.mark_statement();
        self.replay(es, 3);
        if body_value > 0 {
            let old = self.do_stack.pop().flatten();
            let mut exits = vec![join];
            if body_value > 1
                && let Some(frame) = old
            {
                exits.extend(frame.exits);
            }
            self.do_stack.push(Some(DoFrame { exits, top: None }));
        } else {
            self.emit_label(&join);
        }
        Ok(STMT_PLAIN)
    }

    // Output the procedure entry label and the code saving incoming
    // arguments, spliced ahead of the already-generated first statement
    // of the body.
    fn emit_proc(&mut self) -> Result<(), CompileError> {
        let es = self.pop_statement();
        let proc_name = match self.proc_stack.last() {
            Some(name) => name.clone(),
            None => return Ok(()),
        };
        self.emit_label(&proc_name);
        let old_pc = self.pc;
        let proc = self
            .find_proc(&proc_name)
            .cloned()
            .ok_or_else(|| self.err(format!("unknown proc {}", proc_name)))?;

        // the entry procedure returns into the exit trailer
        if self.opts.start.as_deref() == Some(proc_name.as_str()) {
            self.emit("LXI H,__ENDCOM  ; exit address".to_string(), 3);
            self.emit("PUSH H".to_string(), 1);
        }

        if let Some(info) = proc.info().cloned()
            && info.num_args > 0
        {
            let arg = self.proc_arg(&info.arg_names[0], &proc_name)?;
            if arg.scalar_size() == Some(1) {
                self.emit(format!("LXI H,{}  ; store proc arg 1", arg.name()), 3);
                self.emit("MOV M,E".to_string(), 1);
            } else {
                self.emit("XCHG".to_string(), 1);
                self.emit(format!("SHLD {}  ; store proc arg 1", arg.name()), 3);
            }

            if info.num_args >= 2 {
                let arg = self.proc_arg(&info.arg_names[1], &proc_name)?;
                if arg.scalar_size() == Some(1) {
                    self.emit(format!("LXI H,{}  ; store proc arg 2", arg.name()), 3);
                    self.emit("MOV M,C".to_string(), 1);
                } else {
                    self.emit("MOV L,C".to_string(), 1);
                    self.emit("MOV H,B".to_string(), 1);
                    self.emit(format!("SHLD {}  ; store proc arg 2", arg.name()), 3);
                }
            }

            // args 3+ were pushed by the caller; read them back off the
            // stack in reverse order, above the return address
            if info.num_args > 2 {
                self.emit("LXI H,00002H  ; get ext args on stack".to_string(), 3);
                self.emit("DAD SP".to_string(), 1);
                let names: Vec<String> = info.arg_names[2..].iter().rev().cloned().collect();
                for (n, arg_name) in names.iter().enumerate() {
                    let arg = self.proc_arg(arg_name, &proc_name)?;
                    self.emit("MOV A,M  ; proc ext arg load".to_string(), 1);
                    self.emit(format!("STA {}  ; assign LSB", arg.name()), 3);
                    if arg.scalar_size() == Some(1) {
                        if n != names.len() - 1 {
                            self.emit("INX H  ; skip to next arg".to_string(), 1);
                        }
                    } else {
                        self.emit("INX H".to_string(), 1);
                        self.emit("MOV A,M".to_string(), 1);
                        self.emit(format!("STA {}+1  ; assign MSB", arg.name()), 3);
                    }
                }
            }
        }
        self.emit_code();

        let size = self.pc - old_pc;
        self.mark_statement();
        self.replay(es, size);
        Ok(())
    }

    // Whether the last instruction emitted so far is a RET, looking
    // through the pending buffer and then the last sealed block. A
    // label in between means execution can fall past any earlier RET.
    fn ends_with_ret(&self) -> bool {
        if let Some(line) = self.code.last() {
            return get_instr(line) == "RET";
        }
        for sym in self.sym_list.iter().rev() {
            match sym {
                Symbol::CodeBlock { lines, .. } => {
                    return lines.last().map(|l| get_instr(l) == "RET").unwrap_or(false);
                }
                Symbol::Label { .. } => return false,
                _ => {}
            }
        }
        false
    }

    fn proc_arg(&self, arg_name: &str, proc_name: &str) -> Result<Symbol, CompileError> {
        self.lookup_sym(arg_name).ok_or_else(|| {
            self.err(format!(
                "cannot find argument {} for procedure {}",
                arg_name, proc_name
            ))
        })
    }
}
