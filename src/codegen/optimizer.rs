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

// Remove any comment from a line of code.
pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(p) if p > 0 => line[..p].trim_end(),
        _ => line.trim_end(),
    }
}

// Remove the second instruction argument from a line of code.
pub(crate) fn strip_arg2(line: &str) -> &str {
    let s = strip_comment(line);
    match s.rfind(',') {
        Some(p) if p > 0 => s[..p].trim_end(),
        _ => s.trim_end(),
    }
}

// Get the second instruction argument, if any.
pub(crate) fn get_arg2(line: &str) -> Option<&str> {
    let s = strip_comment(line);
    match s.rfind(',') {
        Some(p) if p > 0 => Some(s[p + 1..].trim()),
        _ => None,
    }
}

// Get the first instruction argument, if any.
pub(crate) fn get_arg1(line: &str) -> Option<&str> {
    let mut s = strip_comment(line);
    if let Some(p) = s.rfind(',')
        && p > 0
    {
        s = &s[..p];
    }
    s.split_whitespace().nth(1)
}

// Get just the instruction mnemonic.
pub(crate) fn get_instr(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn parse_imm(arg: &str) -> Option<u32> {
    u32::from_str_radix(arg.trim_end_matches(['H', 'h']), 16).ok()
}

// Local peephole pass over the pending instruction buffer, run when a
// block is sealed. Each rule family is applied to exhaustion before
// the next; rules never span block boundaries.
impl Codegen {
    fn pop2(&mut self, idx: usize, removed: u32) {
        self.code.remove(idx + 1);
        self.code.remove(idx);
        self.pc -= removed;
    }

    fn replace2(&mut self, idx: usize, line: String, removed: u32) {
        self.code.remove(idx + 1);
        self.code.remove(idx);
        self.code.insert(idx, line);
        self.pc -= removed;
    }

    // Pair cancellation and fusion.
    fn opt_pairs(&mut self) -> bool {
        for n in 0..self.code.len().saturating_sub(1) {
            let this = strip_comment(&self.code[n]);
            let next = strip_comment(&self.code[n + 1]);
            if this == "XCHG" && next == "XCHG" {
                self.pop2(n, 2);
                return true;
            }
            if this == "MOV C,M" && next == "MOV A,C" {
                self.replace2(n, "MOV A,M  ; OPT MOVMCA".to_string(), 1);
                return true;
            }
        }
        false
    }

    // Immediate pair coalescing.
    fn opt_immediates(&mut self) -> bool {
        for n in 0..self.code.len().saturating_sub(1) {
            let this = strip_arg2(&self.code[n]);
            let next = strip_arg2(&self.code[n + 1]);
            if this == "MVI E" && next == "MVI D" {
                let low = get_arg2(&self.code[n]).and_then(parse_imm);
                let high = get_arg2(&self.code[n + 1]).and_then(parse_imm);
                if let (Some(low), Some(high)) = (low, high) {
                    self.replace2(
                        n,
                        format!("LXI D,{:05X}H  ; OPT MVIED", (high << 8) + low),
                        1,
                    );
                    return true;
                }
            } else if this == "MVI C" && next == "MVI B" {
                let low = get_arg2(&self.code[n]).and_then(parse_imm);
                let high = get_arg2(&self.code[n + 1]).and_then(parse_imm);
                if let (Some(low), Some(high)) = (low, high) {
                    self.replace2(
                        n,
                        format!("LXI B,{:05X}H  ; OPT MVICB", (high << 8) + low),
                        1,
                    );
                    return true;
                }
            } else if this == "MVI C"
                && next == "MOV A"
                && get_arg2(&self.code[n + 1]) == Some("C")
            {
                if let Some(value) = get_arg2(&self.code[n]).and_then(parse_imm) {
                    self.replace2(n, format!("MVI A,{:03X}H  ; OPT MVICA", value), 1);
                    return true;
                }
            }
        }
        false
    }

    // Tail-call conversion.
    fn opt_tail_calls(&mut self) -> bool {
        for n in 0..self.code.len().saturating_sub(1) {
            if get_instr(&self.code[n]) == "CALL" && get_instr(&self.code[n + 1]) == "RET" {
                if let Some(addr) = get_arg1(&self.code[n]).map(str::to_string) {
                    self.replace2(n, format!("JMP {}  ; OPT CALLRET", addr), 1);
                    return true;
                }
            }
        }
        false
    }

    pub(crate) fn optimize(&mut self) {
        while self.opt_pairs() {}
        while self.opt_immediates() {}
        while self.opt_tail_calls() {}
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Codegen, Options, START_PC};
    use super::*;

    fn opt_gen(lines: &[(&str, u32)]) -> Codegen {
        let mut r#gen = Codegen::new(Options {
            optimize: true,
            ..Options::default()
        });
        for (line, bytes) in lines {
            r#gen.emit(line.to_string(), *bytes);
        }
        r#gen
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_comment("XCHG  ; swap"), "XCHG");
        assert_eq!(strip_arg2("MVI E,005H  ; load"), "MVI E");
        assert_eq!(get_arg2("MVI E,005H  ; load"), Some("005H"));
        assert_eq!(get_arg1("CALL F  ; proc call"), Some("F"));
        assert_eq!(get_instr("JMP __L00001  ; END"), "JMP");
    }

    #[test]
    fn test_xchg_pair_removed() {
        let mut r#gen = opt_gen(&[("XCHG", 1), ("XCHG", 1), ("MOV E,M", 1)]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["MOV E,M".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 1);
    }

    #[test]
    fn test_mov_via_c_fused() {
        let mut r#gen = opt_gen(&[("MOV C,M", 1), ("MOV A,C", 1)]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["MOV A,M  ; OPT MOVMCA".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 1);
    }

    #[test]
    fn test_mvi_pair_coalesced() {
        let mut r#gen = opt_gen(&[
            ("MVI E,010H  ; load const left", 2),
            ("MVI D,000H  ; zero pad MSB", 2),
        ]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["LXI D,00010H  ; OPT MVIED".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 3);
    }

    #[test]
    fn test_mvi_bc_pair_coalesced() {
        let mut r#gen = opt_gen(&[("MVI C,034H", 2), ("MVI B,012H", 2)]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["LXI B,01234H  ; OPT MVICB".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 3);
    }

    #[test]
    fn test_mvi_mov_a_fused() {
        let mut r#gen = opt_gen(&[("MVI C,007H", 2), ("MOV A,C", 1)]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["MVI A,007H  ; OPT MVICA".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 2);
    }

    #[test]
    fn test_tail_call_converted() {
        let mut r#gen = opt_gen(&[("CALL F  ; proc call", 3), ("RET  ; proc return", 1)]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["JMP F  ; OPT CALLRET".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 3);
    }

    #[test]
    fn test_rules_cascade() {
        // XCHG pairs collapse first, then the immediates fuse.
        let mut r#gen = opt_gen(&[
            ("MVI E,001H", 2),
            ("XCHG", 1),
            ("XCHG", 1),
            ("MVI D,002H", 2),
        ]);
        r#gen.optimize();
        assert_eq!(r#gen.code, vec!["LXI D,00201H  ; OPT MVIED".to_string()]);
        assert_eq!(r#gen.pc, START_PC + 3);
    }

    #[test]
    fn test_no_rewrite_when_separated() {
        let mut r#gen = opt_gen(&[("MVI E,001H", 2), ("NOP", 1), ("MVI D,002H", 2)]);
        r#gen.optimize();
        assert_eq!(r#gen.code.len(), 3);
        assert_eq!(r#gen.pc, START_PC + 5);
    }
}
