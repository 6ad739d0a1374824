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

// One open DO. A plain DO pushes None: its END has nothing to emit.
// `exits` are the labels the matching END must place at the loop exit;
// `top` is the loop-back target for DO WHILE and counted DO.
#[derive(Debug, Clone, PartialEq)]
pub struct DoFrame {
    pub exits: Vec<String>,
    pub top: Option<String>,
}

impl DoFrame {
    pub fn exit(label: String) -> Self {
        DoFrame {
            exits: vec![label],
            top: None,
        }
    }

    pub fn looping(exit: String, top: String) -> Self {
        DoFrame {
            exits: vec![exit],
            top: Some(top),
        }
    }
}

// Side structure for an open DO CASE: the label of the eventual DW
// dispatch table, a flag that swallows the DO CASE statement itself
// before the first child is labelled, and the per-case target labels.
// labels[0] is the END label and is not part of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseInfo {
    pub table: String,
    pub first: bool,
    pub labels: Vec<String>,
}
