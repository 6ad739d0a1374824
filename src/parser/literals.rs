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

use crate::errors::CompileError;
use std::collections::HashMap;

const MAX_PASSES: usize = 8;

// LITERALLY declarations are compile-time text macros, so they are
// expanded before the grammar parse. A literal body may itself name
// another literal; passes repeat until a fixpoint, bounded to catch
// self-referential definitions.
pub fn expand_literals(source: &str) -> Result<String, CompileError> {
    let mut text = source.to_string();

    for _ in 0..MAX_PASSES {
        let defs = collect(&text);
        if defs.is_empty() {
            return Ok(text);
        }
        let (next, changed) = substitute(&text, &defs);
        if !changed {
            return Ok(next);
        }
        text = next;
    }

    let defs = collect(&text);
    let (_, changed) = substitute(&text, &defs);
    if changed {
        return Err(CompileError::nowhere(
            "LITERALLY substitution did not terminate".to_string(),
        ));
    }
    Ok(text)
}

#[derive(Debug, PartialEq)]
enum Frag<'a> {
    Ident(&'a str),
    Str(&'a str), // with quotes
    Other(&'a str),
}

fn normalize(name: &str) -> String {
    name.replace('$', "").to_ascii_uppercase()
}

// Split the source into identifier, string and residual fragments,
// leaving comments and string bodies untouched.
fn fragments(src: &str) -> Vec<Frag<'_>> {
    let bytes = src.as_bytes();
    let mut frags = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            let end = src[i + 2..]
                .find("*/")
                .map(|p| i + 2 + p + 2)
                .unwrap_or(bytes.len());
            frags.push(Frag::Other(&src[i..end]));
            i = end;
        } else if bytes[i] == b'\'' {
            let end = src[i + 1..]
                .find('\'')
                .map(|p| i + 1 + p + 1)
                .unwrap_or(bytes.len());
            frags.push(Frag::Str(&src[i..end]));
            i = end;
        } else if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let mut end = i + 1;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'$')
            {
                end += 1;
            }
            frags.push(Frag::Ident(&src[i..end]));
            i = end;
        } else {
            let mut end = i + 1;
            while end < bytes.len()
                && bytes[end] != b'/'
                && bytes[end] != b'\''
                && !bytes[end].is_ascii_alphabetic()
                && bytes[end] != b'_'
            {
                end += 1;
            }
            frags.push(Frag::Other(&src[i..end]));
            i = end;
        }
    }

    frags
}

fn is_trivia(frag: &Frag) -> bool {
    match frag {
        Frag::Other(s) => s.starts_with("/*") || s.trim().is_empty(),
        _ => false,
    }
}

// Scan for IDENT LITERALLY '...' triples.
fn collect(src: &str) -> HashMap<String, String> {
    let frags = fragments(src);
    let sig: Vec<&Frag> = frags.iter().filter(|f| !is_trivia(f)).collect();
    let mut defs = HashMap::new();

    for w in sig.windows(3) {
        if let (Frag::Ident(name), Frag::Ident(kw), Frag::Str(body)) = (w[0], w[1], w[2])
            && normalize(kw) == "LITERALLY"
        {
            let body = &body[1..body.len().saturating_sub(1)];
            defs.insert(normalize(name), body.to_string());
        }
    }

    defs
}

// Rewrite the source with literal names replaced by their bodies. The
// name being declared (the identifier just before LITERALLY) is left
// alone so the declaration survives for the parser.
fn substitute(src: &str, defs: &HashMap<String, String>) -> (String, bool) {
    let frags = fragments(src);
    let mut out = String::with_capacity(src.len());
    let mut changed = false;

    // index of the next significant fragment after each position
    let next_sig: Vec<Option<usize>> = {
        let mut v = vec![None; frags.len()];
        let mut next = None;
        for i in (0..frags.len()).rev() {
            v[i] = next;
            if !is_trivia(&frags[i]) {
                next = Some(i);
            }
        }
        v
    };

    for (i, frag) in frags.iter().enumerate() {
        match frag {
            Frag::Ident(name) => {
                let declares_literal = next_sig[i]
                    .map(|j| matches!(frags[j], Frag::Ident(kw) if normalize(kw) == "LITERALLY"))
                    .unwrap_or(false);
                let key = normalize(name);
                if !declares_literal && defs.contains_key(&key) {
                    out.push_str(&defs[&key]);
                    changed = true;
                } else {
                    out.push_str(name);
                }
            }
            Frag::Str(s) | Frag::Other(s) => out.push_str(s),
        }
    }

    (out, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_simple() {
        let src = "DECLARE CR LITERALLY '0DH';\nX = CR;\n";
        let out = expand_literals(src).unwrap();
        assert!(out.contains("X = 0DH;"));
        assert!(out.contains("CR LITERALLY '0DH'"));
    }

    #[test]
    fn test_expand_chained() {
        let src = "DECLARE A LITERALLY '1', B LITERALLY 'A + 1';\nX = B;\n";
        let out = expand_literals(src).unwrap();
        assert!(out.contains("X = 1 + 1;"));
    }

    #[test]
    fn test_no_expand_in_string_or_comment() {
        let src = "DECLARE CR LITERALLY '0DH';\n/* CR */ MSG(0) = 'CR';\n";
        let out = expand_literals(src).unwrap();
        assert!(out.contains("/* CR */"));
        assert!(out.contains("'CR'"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let src = "DECLARE X LITERALLY 'X + 1';\nY = X;\n";
        assert!(expand_literals(src).is_err());
    }

    #[test]
    fn test_no_literals_passthrough() {
        let src = "X = 1;\n";
        assert_eq!(expand_literals(src).unwrap(), src);
    }
}
