// Copyright 2026 the Term Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `term_tape`: bytecode verification for a register VM running compiled
//! functional code.
//!
//! The verifier statically rejects modules whose instruction stream could
//! crash the emulator or corrupt memory, while letting ordinary type
//! errors through to raise run-time exceptions. See [`verifier`] for the
//! abstract interpreter and [`diag`] for the diagnostic model.
//!
//! ## Example
//!
//! ```
//! extern crate alloc;
//!
//! use alloc::vec;
//!
//! use term_tape::instr::Instr;
//! use term_tape::program::{Function, Label, Module};
//! use term_tape::verifier::{VerifyConfig, verify_module};
//!
//! let id = Function {
//!     name: "id".into(),
//!     arity: 1,
//!     entry: Label(2),
//!     code: vec![
//!         Instr::Label { lbl: Label(1) },
//!         Instr::FuncInfo {
//!             module: "demo".into(),
//!             name: "id".into(),
//!             arity: 1,
//!         },
//!         Instr::Label { lbl: Label(2) },
//!         Instr::Return,
//!     ],
//! };
//! let module = Module {
//!     name: "demo".into(),
//!     exports: vec![],
//!     attributes: vec![],
//!     functions: vec![id],
//!     label_count: 3,
//! };
//! verify_module(&module, &VerifyConfig::default())?;
//! # Ok::<(), term_tape::diag::ModuleError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod diag;
pub(crate) mod fregs;
pub mod instr;
pub mod program;
pub mod types;
pub mod verifier;
