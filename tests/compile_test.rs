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

use plmc::{Options, Trailer, compile};

fn compile_src(source: &str) -> String {
    compile(source, None, &Options::default()).unwrap().asm
}

fn compile_with(source: &str, opts: Options) -> String {
    compile(source, None, &opts).unwrap().asm
}

fn warnings_of(source: &str) -> Vec<String> {
    compile(source, None, &Options::default()).unwrap().warnings
}

// Assert that `needles` appear in the output in the given order.
fn assert_ordered(haystack: &str, needles: &[&str]) {
    let mut pos = 0;
    for needle in needles {
        match haystack[pos..].find(needle) {
            Some(p) => pos += p + needle.len(),
            None => panic!(
                "expected to find {:?} (in order) in:\n{}",
                needle, haystack
            ),
        }
    }
}

// Extract the operand of the first line containing `marker`.
fn jump_target(asm: &str, marker: &str) -> String {
    let line = asm
        .lines()
        .find(|l| l.contains(marker))
        .unwrap_or_else(|| panic!("no line matching {:?} in:\n{}", marker, asm));
    line.split_whitespace()
        .nth(1)
        .unwrap()
        .trim_end_matches(',')
        .to_string()
}

#[test]
fn test_byte_assignment() {
    let asm = compile_src("DECLARE X BYTE;\nX = 5;\n");
    assert_ordered(
        &asm,
        &["MVI E,005H", "LXI H,X", "MOV M,E", "__ENDCOM:", "X\tDS  1", "MEMORY:"],
    );
}

#[test]
fn test_array_data_and_element_store() {
    let asm = compile_src("DECLARE P(4) BYTE DATA(1,2,3,4);\nP(2) = 9;\n");
    assert!(asm.contains("P\tDB  001H,002H,003H,004H"));
    assert_ordered(
        &asm,
        &[
            "MVI E,009H",
            "PUSH D  ; save left array",
            "MVI E,002H",
            "MVI D,000H  ; zero pad index MSB",
            "LXI H,P",
            "DAD D  ; arr offset",
            "POP D  ; arr restore left",
            "MOV M,E",
        ],
    );
}

#[test]
fn test_if_then_skip_label() {
    let asm = compile_src("DECLARE X BYTE;\nIF X = 1 THEN X = 2;\n");
    assert_ordered(&asm, &["XRA A", "CMP E  ; rel result", "; skip if"]);
    let skip = jump_target(&asm, "; skip if");
    // the condition is spliced ahead of the THEN body; the skip label
    // lands after the store of 2
    assert_ordered(
        &asm,
        &["; skip if", "MVI E,002H", "MOV M,E", &format!("{}:", skip)],
    );
}

#[test]
fn test_counted_do_with_call() {
    let asm = compile_src(
        "DECLARE I BYTE;\n\
         F: PROCEDURE (V);\n\
         DECLARE V BYTE;\n\
         RETURN;\n\
         END F;\n\
         DO I = 1 TO 3;\n\
         CALL F(I);\n\
         END;\n",
    );
    assert_ordered(
        &asm,
        &[
            "MVI E,001H",
            "MOV A,E",
            "; DO first iter",
            "MVI E,003H",
            "LDA I  ; DO load",
            "INR A   ; DO update",
            "CMP E   ; DO <=",
            "; > DO complete",
            "STA I  ; DO assign",
            "LXI H,I",
            "MOV E,M",
            "CALL F",
            "; END",
        ],
    );
    let top = jump_target(&asm, "; DO first iter");
    // the END jumps back to the loop top label emitted earlier
    assert!(asm.contains(&format!("{}:", top)));
}

#[test]
fn test_peephole_fuses_immediate_pair() {
    let source = "DECLARE X ADDRESS;\nX = 16;\n";
    let plain = compile_src(source);
    assert_ordered(&plain, &["MVI E,010H", "MVI D,000H"]);

    let opts = Options {
        optimize: true,
        ..Options::default()
    };
    let optimized = compile_with(source, opts);
    assert!(optimized.contains("LXI D,00010H  ; OPT MVIED"));
    assert!(!optimized.contains("MVI E,010H"));
}

#[test]
fn test_do_case_dispatch_and_table() {
    let asm = compile_src(
        "DECLARE K BYTE;\n\
         A: PROCEDURE;\n\
         RETURN;\n\
         END A;\n\
         B: PROCEDURE;\n\
         RETURN;\n\
         END B;\n\
         DO CASE K;\n\
         CALL A;\n\
         CALL B;\n\
         END;\n",
    );
    assert_ordered(
        &asm,
        &[
            "MVI D,000H  ; zero pad CASE MSB",
            "; CASE table",
            "XCHG",
            "DAD H  ; index << 1",
            "DAD D  ; CASE table offset",
            "MOV E,M",
            "INX H",
            "MOV D,M",
            "XCHG",
            "PCHL  ; go to CASE",
            "CALL A",
            "; end CASE",
            "CALL B",
            "; end CASE",
        ],
    );
    let table = jump_target(&asm, "; CASE table");
    let table = table.trim_start_matches("H,");
    let table_line = asm
        .lines()
        .find(|l| l.starts_with(&format!("{}:", table)) && l.contains("DW"))
        .expect("case table line");
    // two case targets in the table
    let targets = table_line.split_once(':').unwrap().1;
    assert_eq!(targets.matches("__L").count(), 2);
}

#[test]
fn test_greater_equal_byte_has_taken_label() {
    // regression for the >= byte-width path: the equality jump must
    // target a label that lands on the true tail
    let asm = compile_src("DECLARE (X, Y) BYTE;\nX = X >= Y;\n");
    assert_ordered(&asm, &["CMP E  ; >=", "MVI E,001H  ; rel true left"]);
    let taken = jump_target(&asm, "JZ ");
    assert_ordered(
        &asm,
        &[&format!("{}:", taken), "MVI E,001H  ; rel true left"],
    );
}

#[test]
fn test_based_byte_load_right() {
    // regression: a size-1 BASED variable on the right side must load
    // through its pointer
    let asm = compile_src(
        "DECLARE PTR ADDRESS;\nDECLARE B BASED PTR BYTE;\nDECLARE X BYTE;\nX = 1 + B;\n",
    );
    assert_ordered(&asm, &["LHLD PTR  ; load based right", "MOV C,M"]);
}

#[test]
fn test_inplace_assign_right_keeps_both_bytes() {
    let asm = compile_src(
        "DECLARE (A, B) ADDRESS;\nDECLARE X ADDRESS;\nX = A + (B := 1234H);\n",
    );
    assert_ordered(
        &asm,
        &["SHLD B ; assign", "MOV C,E  ; inp assign right", "MOV B,D"],
    );
}

#[test]
fn test_compile_is_deterministic() {
    let source = "DECLARE (X, Y) BYTE;\n\
                  DO WHILE X < 10;\n\
                  X = X + 1;\n\
                  Y = Y + X;\n\
                  END;\n";
    assert_eq!(compile_src(source), compile_src(source));
}

#[test]
fn test_do_while_loop_shape() {
    let asm = compile_src("DECLARE X BYTE;\nDO WHILE X;\nX = 0;\nEND;\n");
    assert_ordered(
        &asm,
        &[
            "MOV A,E",
            "ANI 001H  ; bool",
            "XRA A  ; A = 0",
            "CMP E  ; rel result",
            "; skip while",
            "MVI E,000H",
            "; END",
        ],
    );
    let top = jump_target(&asm, "; END");
    assert_ordered(&asm, &[&format!("{}:", top), "; skip while"]);
}

#[test]
fn test_return_widens_to_address() {
    let asm = compile_src("F: PROCEDURE ADDRESS;\nRETURN 1;\nEND F;\n");
    assert_ordered(
        &asm,
        &[
            "F:",
            "MVI E,001H",
            "MVI D,000H  ; zero pad MSB",
            "RET  ; proc return",
        ],
    );
}

#[test]
fn test_void_procedure_gets_ret() {
    let asm = compile_src("DECLARE X BYTE;\nF: PROCEDURE;\nX = 1;\nEND F;\n");
    assert_ordered(&asm, &["F:", "MVI E,001H", "RET  ; proc return"]);
}

#[test]
fn test_entry_procedure_pushes_trailer_address() {
    let opts = Options {
        start: Some("MAIN".to_string()),
        ..Options::default()
    };
    let asm = compile_with("MAIN: PROCEDURE;\nRETURN;\nEND MAIN;\n", opts);
    assert_ordered(
        &asm,
        &[
            "MAIN:",
            "LXI H,__ENDCOM  ; exit address",
            "PUSH H",
            "RET  ; proc return",
            "RET  ; program end",
            "__ENDCOM:",
        ],
    );
    assert!(!asm.contains("JMP __ENDCOM  ; program end"));
}

#[test]
fn test_trailer_modes() {
    let hlt = compile_with(
        "DECLARE X BYTE;\nX = 1;\n",
        Options {
            trailer: Trailer::Hlt,
            ..Options::default()
        },
    );
    assert!(hlt.contains("__ENDCOM:\n\tHLT  ; halt"));

    let mon = compile_with(
        "DECLARE X BYTE;\nX = 1;\n",
        Options {
            trailer: Trailer::Mon,
            ..Options::default()
        },
    );
    assert!(mon.contains("__ENDCOM:\n\tRST 001H  ; go to MON80 debug trap"));

    let ret = compile_src("DECLARE X BYTE;\nX = 1;\n");
    assert!(ret.contains("__ENDCOM:\n\tRET  ; return to caller (CP/M ...)"));
}

#[test]
fn test_procedure_args_spill_to_locals() {
    let asm = compile_src(
        "SUM: PROCEDURE (A, B) BYTE;\n\
         DECLARE (A, B) BYTE;\n\
         RETURN A + B;\n\
         END SUM;\n",
    );
    assert_ordered(
        &asm,
        &[
            "SUM:",
            "LXI H,_SUM_A  ; store proc arg 1",
            "MOV M,E",
            "LXI H,_SUM_B  ; store proc arg 2",
            "MOV M,C",
        ],
    );
    assert_ordered(&asm, &["_SUM_A\tDS  1", "_SUM_B\tDS  1"]);
}

#[test]
fn test_three_arg_call_uses_stack() {
    let asm = compile_src(
        "F3: PROCEDURE (A, B, C);\n\
         DECLARE (A, B, C) BYTE;\n\
         RETURN;\n\
         END F3;\n\
         CALL F3(1, 2, 3);\n",
    );
    assert_ordered(
        &asm,
        &[
            "LXI H,00002H  ; get ext args on stack",
            "MOV A,M  ; proc ext arg load",
            "STA _F3_C  ; assign LSB",
        ],
    );
    assert_ordered(
        &asm,
        &[
            "MVI E,003H",
            "PUSH D  ; proc ext arg",
            "CALL F3  ; proc call",
            "POP H  ; proc ext arg discard",
        ],
    );
}

#[test]
fn test_external_procedure_has_no_body_or_storage() {
    let asm = compile_src(
        "XOUT: PROCEDURE (A, B) EXTERNAL;\n\
         DECLARE (A, B) BYTE;\n\
         END XOUT;\n\
         CALL XOUT(1, 2);\n",
    );
    assert_ordered(&asm, &["MVI E,001H", "MVI C,002H", "CALL XOUT  ; proc call"]);
    assert!(!asm.contains("XOUT:\n"));
    assert!(!asm.contains("_XOUT_A"));
}

#[test]
fn test_indirect_call_through_address() {
    let asm = compile_src("DECLARE V ADDRESS;\nCALL V;\n");
    assert_ordered(
        &asm,
        &[
            "; proc ret",
            "PUSH H",
            "LHLD V  ; proc address",
            "PCHL     ; proc call",
        ],
    );
    let ret = jump_target(&asm, "; proc ret");
    let ret = ret.trim_start_matches("H,");
    assert!(asm.contains(&format!("{}:", ret)));
}

#[test]
fn test_struct_field_load() {
    let asm = compile_src(
        "DECLARE SPTR ADDRESS;\n\
         DECLARE R BASED SPTR STRUCTURE (LO BYTE, HI BYTE);\n\
         DECLARE X BYTE;\n\
         X = R.HI;\n",
    );
    assert_ordered(
        &asm,
        &[
            "LHLD SPTR  ; load struct based left",
            "LXI D,00001H",
            "DAD D     ; struct offset",
            "MOV E,M   ; to (D),E",
        ],
    );
}

#[test]
fn test_length_and_last_fold_to_constants() {
    let asm = compile_src("DECLARE A(10) BYTE;\nDECLARE X BYTE;\nX = LENGTH(A);\nX = LAST(A);\n");
    assert!(asm.contains("MVI E,00AH  ; LENGTH low left"));
    assert!(asm.contains("MVI E,009H  ; LAST low left"));
}

#[test]
fn test_shr_emits_count_loop() {
    let asm = compile_src("DECLARE X BYTE;\nX = SHR(X, 2);\n");
    assert_ordered(
        &asm,
        &[
            "MVI C,002H",
            "ORA A  ; clear carry",
            "MOV A,E",
            "RAR  ; SHR",
            "MOV E,A",
            "DCR C",
            "; more SHR",
        ],
    );
}

#[test]
fn test_stackptr_pseudo_variable() {
    let asm = compile_src("DECLARE SAVE ADDRESS;\nSAVE = STACKPTR;\nSTACKPTR = SAVE;\n");
    assert_ordered(
        &asm,
        &[
            "LXI H,00000H  ; load STACKPTR left",
            "DAD SP",
            "SHLD SAVE ; assign",
            "SPHL  ; assign STACKPTR",
        ],
    );
}

#[test]
fn test_carry_flag_pseudo_variable() {
    let asm = compile_src("DECLARE X BYTE;\nX = CARRY;\n");
    assert_ordered(
        &asm,
        &[
            "; CARRY",
            "MVI E,001H  ; flags true left",
            "MVI E,000H  ; flags false left",
        ],
    );
}

#[test]
fn test_inline_reference_becomes_anonymous_array() {
    let asm = compile_src("DECLARE P ADDRESS;\nP = .(1,'AB');\n");
    assert!(asm.contains("; load ref left"));
    let name = jump_target(&asm, "; load ref left");
    let name = name.trim_start_matches("D,");
    assert!(asm.contains(&format!("{}\tDB  001H,041H,042H", name)));
}

#[test]
fn test_address_data_with_reference() {
    let asm = compile_src("DECLARE W ADDRESS DATA(.MSG);\nDECLARE MSG(*) BYTE DATA('HI');\n");
    assert!(asm.contains("W\tDW  MSG"));
    assert!(asm.contains("MSG\tDB  048H,049H"));
}

#[test]
fn test_uninitialized_data_follows_trailer() {
    let asm = compile_src("DECLARE X BYTE;\nDECLARE Y ADDRESS;\nDECLARE BUF(8) BYTE;\nX = 1;\n");
    assert_ordered(
        &asm,
        &[
            "__ENDCOM:",
            "X\tDS  1",
            "Y\tDS  2",
            "BUF\tDB  8  DUP(?)",
            "MEMORY:",
        ],
    );
}

#[test]
fn test_initialize_option_zeroes_data() {
    let opts = Options {
        initialize: true,
        ..Options::default()
    };
    let asm = compile_with("DECLARE X BYTE;\nDECLARE P(2) ADDRESS;\nX = 1;\n", opts);
    assert!(asm.contains("X\tDB  000H"));
    assert!(asm.contains("P\tDW  00000H,00000H"));
}

#[test]
fn test_external_assembly_inlined_before_trailer() {
    let external = "XOUT:\n\tOUT 001H\n\n\tRET\n";
    let result = compile(
        "DECLARE X BYTE;\nX = 1;\n",
        Some(external),
        &Options::default(),
    )
    .unwrap();
    assert_ordered(&result.asm, &["XOUT:", "OUT 001H", "RET", "__ENDCOM:"]);
    // blank lines in the external file are dropped
    assert!(!result.asm.contains("RET\n\n\tRET"));
}

#[test]
fn test_goto_and_label() {
    let asm = compile_src("DECLARE X BYTE;\nAGAIN:\nX = 1;\nGO TO AGAIN;\n");
    assert_ordered(&asm, &["AGAIN:", "JMP AGAIN  ; GO TO"]);
}

#[test]
fn test_if_then_else_join() {
    let asm = compile_src("DECLARE X BYTE;\nIF X = 1 THEN X = 2;\nELSE X = 3;\n");
    let join = jump_target(&asm, "; skip else");
    let skip = jump_target(&asm, "; skip if");
    assert_ordered(
        &asm,
        &[
            "; skip if",
            "MVI E,002H",
            "; skip else",
            &format!("{}:", skip),
            "MVI E,003H",
            &format!("{}:", join),
        ],
    );
}

#[test]
fn test_if_then_do_folds_skip_into_end() {
    let asm = compile_src(
        "DECLARE (X, Y) BYTE;\nIF X = 1 THEN DO;\nY = 2;\nY = 3;\nEND;\nX = 4;\n",
    );
    let skip = jump_target(&asm, "; skip if");
    // the skip label is emitted by the matching END, after the body
    assert_ordered(
        &asm,
        &["; skip if", "MVI E,002H", "MVI E,003H", &format!("{}:", skip), "MVI E,004H"],
    );
}

#[test]
fn test_literally_macro_expansion() {
    let asm = compile_src("DECLARE CR LITERALLY '0DH';\nDECLARE X BYTE;\nX = CR;\n");
    assert!(asm.contains("MVI E,00DH"));
}

#[test]
fn test_multiple_assignment_shares_value() {
    let asm = compile_src("DECLARE (A, B) BYTE;\nA, B = 7;\n");
    assert_ordered(
        &asm,
        &["MVI E,007H", "LXI H,A", "MOV M,E", "LXI H,B", "MOV M,E"],
    );
}

#[test]
fn test_at_variable_aliases_address() {
    let asm = compile_src("DECLARE STAT BYTE AT(0F0H);\nSTAT = 1;\n");
    assert_ordered(&asm, &["LXI H,000F0H   ; assign", "MOV M,E"]);
    // an alias owns no storage
    assert!(!asm.contains("STAT\tDS"));
}

#[test]
fn test_index_overflow_warns() {
    let warnings = warnings_of("DECLARE A(3) BYTE;\nA(5) = 1;\n");
    assert!(warnings.iter().any(|w| w.contains("array A index 5 overflow")));
}

#[test]
fn test_byte_truncation_warns() {
    let warnings = warnings_of("DECLARE X BYTE;\nDECLARE Y ADDRESS;\nX = Y;\n");
    assert!(warnings.iter().any(|w| w.contains("BYTE variable overflow X")));
}

#[test]
fn test_length_boundary_index_warns() {
    let warnings = warnings_of("DECLARE A(4) BYTE;\nA(4) = 0;\n");
    assert!(warnings.iter().any(|w| w.contains("array A index 4 overflow")));
}

#[test]
fn test_missing_return_is_fatal() {
    let result = compile(
        "F: PROCEDURE BYTE;\nDECLARE Q BYTE;\nQ = 1;\nEND F;\n",
        None,
        &Options::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_unmatched_end_is_fatal() {
    assert!(compile("END;\n", None, &Options::default()).is_err());
}

#[test]
fn test_unclosed_do_is_fatal() {
    assert!(
        compile(
            "DECLARE X BYTE;\nDO;\nX = 1;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_constant_too_large_is_fatal() {
    assert!(
        compile(
            "DECLARE X ADDRESS;\nX = 10000H;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_redeclaration_is_fatal() {
    assert!(
        compile(
            "DECLARE X BYTE;\nDECLARE X BYTE;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_undefined_identifier_is_fatal() {
    assert!(compile("X = 1;\n", None, &Options::default()).is_err());
}

#[test]
fn test_byte_reference_initializer_is_fatal() {
    assert!(
        compile(
            "DECLARE X BYTE DATA(.Y);\nDECLARE Y BYTE;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_based_target_must_be_address() {
    assert!(
        compile(
            "DECLARE P BYTE;\nDECLARE B BASED P BYTE;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_call_arity_mismatch_is_fatal() {
    assert!(
        compile(
            "F: PROCEDURE (A);\nDECLARE A BYTE;\nRETURN;\nEND F;\nCALL F;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_not_requires_byte() {
    assert!(
        compile(
            "DECLARE X BYTE;\nDECLARE Y ADDRESS;\nX = NOT Y;\n",
            None,
            &Options::default()
        )
        .is_err()
    );
}

#[test]
fn test_peephole_preserves_structure() {
    // optimized output differs only in fused lines, never in labels
    let source = "DECLARE (X, Y) BYTE;\n\
                  F: PROCEDURE (V) BYTE;\n\
                  DECLARE V BYTE;\n\
                  RETURN V + 1;\n\
                  END F;\n\
                  DO WHILE X < 10;\n\
                  X = F(X);\n\
                  Y = SHR(X, 1);\n\
                  END;\n";
    let plain = compile_src(source);
    let optimized = compile_with(
        source,
        Options {
            optimize: true,
            ..Options::default()
        },
    );
    let labels = |asm: &str| {
        asm.lines()
            .filter(|l| l.starts_with("__L") && l.contains(':'))
            .count()
    };
    assert_eq!(labels(&plain), labels(&optimized));
    assert!(optimized.len() <= plain.len());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("prog.plm");
    let out_path = dir.path().join("prog.asm");
    std::fs::write(&in_path, "DECLARE X BYTE;\nX = 5;\n").unwrap();

    let source = std::fs::read_to_string(&in_path).unwrap();
    let result = compile(&source, None, &Options::default()).unwrap();
    std::fs::write(&out_path, &result.asm).unwrap();

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert!(written.starts_with(";\n; File generated by the plmc compiler"));
    assert!(written.ends_with("MEMORY:\n"));
}

#[test]
fn test_mul_and_div_widen_to_address() {
    let asm = compile_src("DECLARE (X, Y) BYTE;\nDECLARE Z ADDRESS;\nZ = X * Y;\nZ = X / Y;\n");
    assert_ordered(
        &asm,
        &[
            "MVI B,008H  ; * count",
            "LXI H,00000H  ; * init",
            "; * check bits of right arg",
            "DAD D",
            "; * more bits",
            "XCHG  ; * result to D,E",
            "LXI H,00000H  ; / init",
            "SBB B",
            "; / complete",
            "XCHG  ; / result to D,E",
        ],
    );
}
