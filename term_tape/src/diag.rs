// Copyright 2026 the Term Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured diagnostics.
//!
//! A transfer function that detects an unsafe instruction returns a
//! [`Reason`]; the per-instruction boundary wraps it into a [`Diagnostic`]
//! together with the function's `module:name/arity` triple, the offending
//! instruction and its offset. Verification never stops at the first bad
//! function: one diagnostic is collected per failing function.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::instr::{Instr, Operand};
use crate::program::{Label, Mfa};
use crate::types::{LabelSet, Type};
use crate::verifier::{FloatState, Frame};

/// A register reference carried in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reg {
    /// An X register.
    X(u32),
    /// A Y register.
    Y(u32),
    /// A float register.
    Fr(u32),
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X(n) => write!(f, "{{x,{n}}}"),
            Self::Y(n) => write!(f, "{{y,{n}}}"),
            Self::Fr(n) => write!(f, "{{fr,{n}}}"),
        }
    }
}

/// Why an instruction was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reason {
    /// A register was read before being written on some path.
    UninitializedReg(Reg),
    /// An operand cannot be used as a source.
    BadSource(Operand),
    /// A source had the wrong abstract type.
    BadType(Type),
    /// An operand cannot be used as a destination.
    InvalidStore(Operand),
    /// A catch tag was touched by something other than its disposal opcode.
    Catchtag(LabelSet),
    /// A try tag was touched by something other than its disposal opcode.
    Trytag(LabelSet),
    /// A register holding an unfinished tuple was read.
    TupleInProgress,
    /// A match context was used where a plain term was expected.
    MatchContext(Reg),
    /// A binary-match opcode ran without a match context.
    NoBsmContext(Operand),
    /// `bs_save2` targeted a slot outside the context.
    IllegalSave(u32),
    /// `bs_restore2` targeted a slot that holds no saved position.
    IllegalRestore(u32),
    /// A tail call passed a match context to a function that does not
    /// start a binary match.
    NoBsStartMatch2(Label),
    /// A tail call passed a match context to a function whose
    /// `bs_start_match2` does not accept it.
    UnsuitableBsStartMatch2(Label),
    /// More than one live copy of a match context at a tail call.
    MultipleMatchContexts,
    /// A frame was allocated while one already exists.
    ExistingStackFrame,
    /// A stack frame exists where none is allowed.
    Allocated(Frame),
    /// The stack frame size does not fit the instruction.
    StackFrame(Frame),
    /// `trim` does not fit the current frame.
    Trim {
        /// Slots the instruction tried to drop.
        n: u32,
        /// The frame it tried to drop them from.
        frame: Frame,
    },
    /// A heap reservation was exceeded.
    HeapOverflow {
        /// Words left in the reservation.
        left: u32,
        /// Words the instruction needed.
        need: u32,
    },
    /// A float opcode ran in the wrong float error state.
    BadFloatingPointState(FloatState),
    /// A non-float instruction ran inside a cleared float block.
    UnsafeInstruction,
    /// `set_tuple_element` without a preceding `erlang:setelement/3`.
    IllegalContextForSetTupleElement,
    /// The top of the handler stack is not a single known label.
    UnknownCatchTryState,
    /// The handler stack differs between merged paths.
    AmbiguousCatchTryState,
    /// The frame size differs between merged paths.
    UnknownSizeOfStackframe,
    /// A handler tag was still active where none may remain.
    UnfinishedCatchTry,
    /// A new handler tag was not above all enclosing tags.
    BadTryCatchNesting {
        /// The slot the new tag was written to.
        tag: Reg,
        /// Y indices of the enclosing tags.
        active: Vec<u32>,
    },
    /// A live-register count is out of range.
    BadNumberOfLiveRegs(u32),
    /// A register below the declared live count is not defined.
    NotLive(Reg),
    /// The declared entry label is missing from the function header.
    NoEntryLabel(Label),
    /// The instruction is shaped wrongly for its opcode.
    IllegalInstruction,
    /// The opcode is not in the catalogue and no extension claimed it.
    UnknownInstruction,
    /// A `put` ran outside a `put_tuple` run, or a run was left unfinished.
    NotBuildingATuple,
    /// A `select_val` list is malformed or mixes selector types.
    BadSelectList,
    /// A `select_tuple_arity` list is malformed.
    BadTupleArityList,
    /// A map operation repeats a key.
    KeysNotUnique,
    /// A map operation carries no fields.
    EmptyFieldList,
    /// A fragile term was stored in a Y register.
    FragileMessageReference(Reg),
    /// A register or float index exceeded an implementation limit.
    Limit,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UninitializedReg(r) => write!(f, "{{uninitialized_reg,{r}}}"),
            Self::BadSource(op) => write!(f, "{{bad_source,{op}}}"),
            Self::BadType(t) => write!(f, "{{bad_type,{t}}}"),
            Self::InvalidStore(op) => write!(f, "{{invalid_store,{op}}}"),
            Self::Catchtag(ls) => write!(f, "{{catchtag,{}}}", LabelList(ls)),
            Self::Trytag(ls) => write!(f, "{{trytag,{}}}", LabelList(ls)),
            Self::TupleInProgress => write!(f, "tuple_in_progress"),
            Self::MatchContext(r) => write!(f, "{{match_context,{r}}}"),
            Self::NoBsmContext(op) => write!(f, "{{no_bsm_context,{op}}}"),
            Self::IllegalSave(s) => write!(f, "{{illegal_save,{s}}}"),
            Self::IllegalRestore(s) => write!(f, "{{illegal_restore,{s}}}"),
            Self::NoBsStartMatch2(l) => write!(f, "{{no_bs_start_match2,{l}}}"),
            Self::UnsuitableBsStartMatch2(l) => {
                write!(f, "{{unsuitable_bs_start_match2,{l}}}")
            }
            Self::MultipleMatchContexts => write!(f, "multiple_match_contexts"),
            Self::ExistingStackFrame => write!(f, "existing_stack_frame"),
            Self::Allocated(n) => write!(f, "{{allocated,{n}}}"),
            Self::StackFrame(n) => write!(f, "{{stack_frame,{n}}}"),
            Self::Trim { n, frame } => write!(f, "{{trim,{n},{frame}}}"),
            Self::HeapOverflow { left, need } => {
                write!(f, "{{heap_overflow,{{left,{left}}},{{wanted,{need}}}}}")
            }
            Self::BadFloatingPointState(s) => {
                write!(f, "{{bad_floating_point_state,{s}}}")
            }
            Self::UnsafeInstruction => write!(f, "unsafe_instruction"),
            Self::IllegalContextForSetTupleElement => {
                write!(f, "illegal_context_for_set_tuple_element")
            }
            Self::UnknownCatchTryState => write!(f, "unknown_catch_try_state"),
            Self::AmbiguousCatchTryState => write!(f, "ambiguous_catch_try_state"),
            Self::UnknownSizeOfStackframe => write!(f, "unknown_size_of_stackframe"),
            Self::UnfinishedCatchTry => write!(f, "unfinished_catch_try"),
            Self::BadTryCatchNesting { tag, active } => {
                write!(f, "{{bad_try_catch_nesting,{tag},[")?;
                for (i, y) in active.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{{y,{y}}}")?;
                }
                write!(f, "]}}")
            }
            Self::BadNumberOfLiveRegs(n) => write!(f, "{{bad_number_of_live_regs,{n}}}"),
            Self::NotLive(r) => write!(f, "{{not_live,{r}}}"),
            Self::NoEntryLabel(l) => write!(f, "{{no_entry_label,{}}}", l.0),
            Self::IllegalInstruction => write!(f, "illegal_instruction"),
            Self::UnknownInstruction => write!(f, "unknown_instruction"),
            Self::NotBuildingATuple => write!(f, "not_building_a_tuple"),
            Self::BadSelectList => write!(f, "bad_select_list"),
            Self::BadTupleArityList => write!(f, "bad_tuple_arity_list"),
            Self::KeysNotUnique => write!(f, "keys_not_unique"),
            Self::EmptyFieldList => write!(f, "empty_field_list"),
            Self::FragileMessageReference(r) => {
                write!(f, "{{fragile_message_reference,{r}}}")
            }
            Self::Limit => write!(f, "limit"),
        }
    }
}

struct LabelList<'a>(&'a [Label]);

impl fmt::Display for LabelList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, l) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", l.0)?;
        }
        write!(f, "]")
    }
}

/// What went wrong in one function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A specific instruction was rejected.
    Instr {
        /// The offending instruction.
        instr: Instr,
        /// Its offset in the function's instruction list.
        offset: usize,
        /// Why it was rejected.
        reason: Reason,
    },
    /// Labels were referenced but never defined.
    UndefLabels {
        /// The undefined labels.
        labels: Vec<Label>,
    },
}

/// A per-function diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The function the diagnostic belongs to.
    pub mfa: Mfa,
    /// What went wrong.
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Instr {
                instr,
                offset,
                reason: Reason::Limit,
            } => {
                writeln!(f, "function {}:", self.mfa)?;
                writeln!(
                    f,
                    "  an implementation limit was exceeded at offset {offset}."
                )?;
                writeln!(
                    f,
                    "  Try splitting the function into smaller functions."
                )?;
                write!(f, "    {instr}")
            }
            DiagnosticKind::Instr {
                instr,
                offset,
                reason,
            } => {
                writeln!(f, "function {}:", self.mfa)?;
                writeln!(f, "  the instruction at offset {offset} is unsafe.")?;
                writeln!(f, "  reason: {reason}")?;
                write!(f, "    {instr}")
            }
            DiagnosticKind::UndefLabels { labels } => {
                writeln!(f, "function {}:", self.mfa)?;
                writeln!(
                    f,
                    "  internal consistency check failed - please report this bug."
                )?;
                write!(f, "  undefined labels: {}", LabelList(labels))
            }
        }
    }
}

/// The failure result of verifying a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleError {
    /// Name of the rejected module.
    pub module: String,
    /// One diagnostic per failing function.
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} is unsafe:", self.module)?;
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl core::error::Error for ModuleError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn mfa() -> Mfa {
        Mfa {
            module: "t".into(),
            name: "f".into(),
            arity: 1,
        }
    }

    #[test]
    fn reasons_render_as_tagged_tuples() {
        assert_eq!(
            Reason::StackFrame(Frame::Size(2)).to_string(),
            "{stack_frame,2}"
        );
        assert_eq!(
            Reason::FragileMessageReference(Reg::Y(0)).to_string(),
            "{fragile_message_reference,{y,0}}"
        );
        assert_eq!(
            Reason::BadFloatingPointState(FloatState::Undefined).to_string(),
            "{bad_floating_point_state,undefined}"
        );
    }

    #[test]
    fn limit_diagnostics_hint_at_refactoring() {
        let d = Diagnostic {
            mfa: mfa(),
            kind: DiagnosticKind::Instr {
                instr: Instr::Return,
                offset: 3,
                reason: Reason::Limit,
            },
        };
        let text = d.to_string();
        assert!(text.contains("implementation limit"));
        assert!(text.contains("smaller functions"));
    }

    #[test]
    fn undef_labels_reads_as_a_compiler_bug() {
        let d = Diagnostic {
            mfa: mfa(),
            kind: DiagnosticKind::UndefLabels {
                labels: vec![Label(9)],
            },
        };
        assert!(d.to_string().contains("report this bug"));
    }
}
