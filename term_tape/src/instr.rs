// Copyright 2026 the Term Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction and operand model.
//!
//! Instructions are tagged tuples in the compiler's assembly format: an
//! opcode name plus a fixed operand shape. This module defines the typed
//! form the verifier consumes, and renders instructions back in their
//! source shape for diagnostics.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::program::{F64Bits, Label, Lit};

/// An instruction operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// An X register (`{x,N}`).
    X(u32),
    /// A Y register (`{y,N}`).
    Y(u32),
    /// A float register (`{fr,N}`).
    Fr(u32),
    /// A code label (`{f,L}`).
    F(Label),
    /// An atom immediate.
    Atom(String),
    /// An integer immediate.
    Integer(i64),
    /// A float immediate, as raw bits.
    Float(F64Bits),
    /// A literal term.
    Literal(Lit),
    /// The empty list.
    Nil,
    /// A nested operand list.
    List(Vec<Operand>),
}

impl Operand {
    /// Returns `true` for X and Y registers.
    #[must_use]
    pub fn is_reg(&self) -> bool {
        matches!(self, Self::X(_) | Self::Y(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X(n) => write!(f, "{{x,{n}}}"),
            Self::Y(n) => write!(f, "{{y,{n}}}"),
            Self::Fr(n) => write!(f, "{{fr,{n}}}"),
            Self::F(l) => write!(f, "{l}"),
            Self::Atom(a) => write!(f, "{{atom,{a}}}"),
            Self::Integer(i) => write!(f, "{{integer,{i}}}"),
            Self::Float(x) => write!(f, "{{float,{x}}}"),
            Self::Literal(l) => write!(f, "{{literal,{l}}}"),
            Self::Nil => write!(f, "nil"),
            Self::List(xs) => {
                write!(f, "{{list,[")?;
                for (i, x) in xs.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]}}")
            }
        }
    }
}

/// A remote `module:name/arity` call target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtFunc {
    /// Target module.
    pub module: String,
    /// Target function.
    pub name: String,
    /// Target arity.
    pub arity: u32,
}

impl fmt::Display for ExtFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{extfunc,{},{},{}}}", self.module, self.name, self.arity)
    }
}

/// A heap reservation request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Alloc {
    /// Plain heap words.
    Words(u32),
    /// Heap words plus float heap words.
    Mixed {
        /// Plain heap words.
        words: u32,
        /// Float heap words.
        floats: u32,
    },
}

impl fmt::Display for Alloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Words(w) => write!(f, "{w}"),
            Self::Mixed { words, floats } => {
                write!(f, "{{alloc,[{{words,{words}}},{{floats,{floats}}}]}}")
            }
        }
    }
}

/// UTF encoding width for the `bs_*_utf*` instruction families.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Utf {
    /// UTF-8.
    Utf8,
    /// UTF-16.
    Utf16,
    /// UTF-32.
    Utf32,
}

impl Utf {
    fn digits(self) -> &'static str {
        match self {
            Self::Utf8 => "8",
            Self::Utf16 => "16",
            Self::Utf32 => "32",
        }
    }
}

/// A typed instruction.
///
/// Variants mirror the assembly opcode catalogue; operand names follow the
/// assembly shapes, with labels pulled out as [`Label`] where the shape is
/// always `{f,L}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    /// Defines label `lbl` at this point in the stream.
    Label {
        /// The label being defined.
        lbl: Label,
    },
    /// The `func_info` header, also the failure point for function-clause
    /// errors.
    FuncInfo {
        /// Module name.
        module: String,
        /// Function name.
        name: String,
        /// Function arity.
        arity: u32,
    },
    /// Source-line marker.
    Line {
        /// Location index into the module's line table.
        loc: u32,
    },
    /// Assembler comment; carries no semantics.
    Comment {
        /// Comment text.
        text: String,
    },

    /// `dst = src`.
    Move {
        /// Source register or immediate.
        src: Operand,
        /// Destination register.
        dst: Operand,
    },
    /// Resets a Y slot to a GC-safe opaque term.
    Init {
        /// The Y register to reset.
        y: Operand,
    },
    /// Same as `init`; retained under its historical name.
    Kill {
        /// The Y register to reset.
        y: Operand,
    },

    /// Reserves heap words, garbage collecting if needed.
    TestHeap {
        /// Requested reservation.
        need: Alloc,
        /// Number of live X registers across the potential collection.
        live: u32,
    },

    /// `dst = [head | tail]`. Takes two heap words.
    PutList {
        /// Head term.
        head: Operand,
        /// Tail term.
        tail: Operand,
        /// Destination register.
        dst: Operand,
    },
    /// Opens a tuple build of `arity` elements; must be followed by exactly
    /// `arity` `put` instructions.
    PutTuple {
        /// Tuple size.
        arity: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Fills the next slot of an open tuple build.
    Put {
        /// Element term.
        src: Operand,
    },
    /// Builds a whole tuple in one instruction.
    PutTuple2 {
        /// Destination register.
        dst: Operand,
        /// Element terms.
        elems: Vec<Operand>,
    },

    /// Shrinks the stack frame by dropping its `n` lowest slots.
    Trim {
        /// Slots to drop.
        n: u32,
        /// Slots remaining afterwards.
        remaining: u32,
    },
    /// Allocates a stack frame of `stack` slots.
    Allocate {
        /// Frame size.
        stack: u32,
        /// Live X registers.
        live: u32,
    },
    /// Allocates a stack frame with all slots pre-initialized.
    AllocateZero {
        /// Frame size.
        stack: u32,
        /// Live X registers.
        live: u32,
    },
    /// Allocates a stack frame and reserves heap in one step.
    AllocateHeap {
        /// Frame size.
        stack: u32,
        /// Heap reservation.
        heap: Alloc,
        /// Live X registers.
        live: u32,
    },
    /// [`Instr::AllocateHeap`] with pre-initialized slots.
    AllocateHeapZero {
        /// Frame size.
        stack: u32,
        /// Heap reservation.
        heap: Alloc,
        /// Live X registers.
        live: u32,
    },
    /// Frees the current stack frame of `n` slots.
    Deallocate {
        /// Expected frame size.
        n: u32,
    },

    /// Installs a catch tag in a Y slot.
    Catch {
        /// Tag slot.
        dst: Operand,
        /// Handler label.
        fail: Label,
    },
    /// Removes a catch tag and delivers the caught value in `x0`.
    CatchEnd {
        /// Tag slot.
        dst: Operand,
    },
    /// Installs a try tag in a Y slot.
    Try {
        /// Tag slot.
        dst: Operand,
        /// Handler label.
        fail: Label,
    },
    /// Removes a try tag on the success path.
    TryEnd {
        /// Tag slot.
        dst: Operand,
    },
    /// Removes a try tag on the handler path and delivers class/reason/
    /// stacktrace in `x0..x2`.
    TryCase {
        /// Tag slot.
        dst: Operand,
    },

    /// `dst = element(index + 1, src)`.
    GetTupleElement {
        /// Tuple source.
        src: Operand,
        /// Zero-based element index.
        index: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Destructures a cons cell into head and tail registers.
    GetList {
        /// Cons source.
        src: Operand,
        /// Head destination.
        hd: Operand,
        /// Tail destination.
        tl: Operand,
    },

    /// Unconditional jump.
    Jump {
        /// Target label.
        lbl: Label,
    },
    /// Receive-loop marker; no verification obligations.
    RecvMark {
        /// Marked loop label.
        lbl: Label,
    },
    /// Receive-loop marker; no verification obligations.
    RecvSet {
        /// Marked loop label.
        lbl: Label,
    },

    /// Raises a `badmatch` error.
    Badmatch {
        /// The unmatched term.
        src: Operand,
    },
    /// Raises a `case_clause` error.
    CaseEnd {
        /// The unmatched term.
        src: Operand,
    },
    /// Raises a `try_clause` error.
    TryCaseEnd {
        /// The unmatched term.
        src: Operand,
    },
    /// Raises an `if_clause` error.
    IfEnd,

    /// Converts a match context back into a binary in place.
    BsContextToBinary {
        /// Register holding the context.
        src: Operand,
    },

    /// Converts a numeric term into a float register.
    Fconv {
        /// Numeric source term.
        src: Operand,
        /// Destination float register.
        dst: Operand,
    },
    /// Moves a float between a float register and a term register.
    Fmove {
        /// Source (term register holding a float, or a float register).
        src: Operand,
        /// Destination (the other kind).
        dst: Operand,
    },
    /// Clears the pending floating-point error state.
    Fclearerror,
    /// Checks for a deferred floating-point error.
    Fcheckerror {
        /// Always `{f,0}` in compiler output.
        fail: Label,
    },

    /// Local call.
    Call {
        /// Argument count.
        arity: u32,
        /// Callee entry label.
        lbl: Label,
    },
    /// Local tail call; frees the frame of `dealloc` slots.
    CallLast {
        /// Argument count.
        arity: u32,
        /// Callee entry label.
        lbl: Label,
        /// Frame size to free.
        dealloc: u32,
    },
    /// Local tail call without a stack frame.
    CallOnly {
        /// Argument count.
        arity: u32,
        /// Callee entry label.
        lbl: Label,
    },
    /// Remote call.
    CallExt {
        /// Argument count.
        arity: u32,
        /// Callee.
        func: ExtFunc,
    },
    /// Remote tail call; frees the frame of `dealloc` slots.
    CallExtLast {
        /// Argument count.
        arity: u32,
        /// Callee.
        func: ExtFunc,
        /// Frame size to free.
        dealloc: u32,
    },
    /// Remote tail call without a stack frame.
    CallExtOnly {
        /// Argument count.
        arity: u32,
        /// Callee.
        func: ExtFunc,
    },
    /// Calls the fun in `x[arity]` with `arity` arguments.
    CallFun {
        /// Argument count.
        arity: u32,
    },
    /// `apply(x[arity], x[arity+1], args)`.
    Apply {
        /// Argument count.
        arity: u32,
    },
    /// Tail-call form of [`Instr::Apply`].
    ApplyLast {
        /// Argument count.
        arity: u32,
        /// Frame size to free.
        dealloc: u32,
    },

    /// Calls a built-in function.
    Bif {
        /// BIF name.
        op: String,
        /// Failure label, or `{f,0}` to raise in place.
        fail: Label,
        /// Argument operands.
        args: Vec<Operand>,
        /// Destination register.
        dst: Operand,
    },
    /// Calls a built-in function that may trigger garbage collection.
    GcBif {
        /// BIF name.
        op: String,
        /// Failure label, or `{f,0}` to raise in place.
        fail: Label,
        /// Live X registers across the potential collection.
        live: u32,
        /// Argument operands.
        args: Vec<Operand>,
        /// Destination register.
        dst: Operand,
    },

    /// Returns from the current function with the value in `x0`.
    Return,

    /// Peeks the next message into a register; branches when the mailbox is
    /// empty.
    LoopRec {
        /// Empty-mailbox label.
        fail: Label,
        /// Message destination.
        dst: Operand,
    },
    /// Advances the receive loop to the next message.
    LoopRecEnd {
        /// Loop head label.
        lbl: Label,
    },
    /// Suspends until a new message arrives.
    Wait {
        /// Loop head label.
        lbl: Label,
    },
    /// Suspends with a timeout.
    WaitTimeout {
        /// Loop head label.
        lbl: Label,
        /// Timeout value.
        src: Operand,
    },
    /// Resets the receive loop after a timeout.
    Timeout,
    /// Sends `x1` to the process in `x0`.
    Send,
    /// Removes the current message from the mailbox.
    RemoveMessage,

    /// Destructively writes a tuple element; only legal right after
    /// `erlang:setelement/3`.
    SetTupleElement {
        /// New element value.
        src: Operand,
        /// Tuple register.
        tuple: Operand,
        /// Zero-based element index.
        index: u32,
    },

    /// Multi-way branch on a term value.
    SelectVal {
        /// Scrutinee.
        src: Operand,
        /// Fallback label.
        fail: Label,
        /// Value/label pairs.
        list: Vec<(Operand, Label)>,
    },
    /// Multi-way branch on tuple arity.
    SelectTupleArity {
        /// Scrutinee.
        src: Operand,
        /// Fallback label.
        fail: Label,
        /// Arity/label pairs.
        list: Vec<(u32, Label)>,
    },

    /// A guard test: branches to `fail` when the test is false.
    Test {
        /// Test name (`is_tuple`, `is_eq_exact`, `test_arity`, ...).
        op: String,
        /// Branch target when the test fails.
        fail: Label,
        /// Test operands.
        args: Vec<Operand>,
    },

    /// Opens a binary match context over a binary term.
    BsStartMatch2 {
        /// Not-a-binary label.
        fail: Label,
        /// Live X registers.
        live: u32,
        /// Source term (or an existing context when equal to `dst`).
        src: Operand,
        /// Number of save slots.
        slots: u32,
        /// Context destination.
        dst: Operand,
    },
    /// Matches a literal bit string.
    BsMatchString {
        /// Mismatch label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Bit length of the literal.
        bits: u64,
        /// Literal bytes.
        string: Vec<u8>,
    },
    /// Skips over bits in the context.
    BsSkipBits2 {
        /// Out-of-data label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Bit count term.
        size: Operand,
        /// Size unit.
        unit: u32,
    },
    /// Skips a UTF-encoded code point.
    BsSkipUtf {
        /// Encoding width.
        width: Utf,
        /// Decode-failure label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Live X registers.
        live: u32,
    },
    /// Succeeds when exactly `bits` bits remain.
    BsTestTail2 {
        /// Mismatch label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Expected remaining bits.
        bits: u64,
    },
    /// Succeeds when the remaining bits are a multiple of `unit`.
    BsTestUnit {
        /// Mismatch label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Unit divisor.
        unit: u32,
    },
    /// Extracts an integer field.
    BsGetInteger2 {
        /// Out-of-data label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Live X registers.
        live: u32,
        /// Bit count term.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Extracts a float field.
    BsGetFloat2 {
        /// Out-of-data label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Live X registers.
        live: u32,
        /// Bit count term.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Extracts a sub-binary.
    BsGetBinary2 {
        /// Out-of-data label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Live X registers.
        live: u32,
        /// Bit count term, or `{atom,all}`.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Extracts a UTF-encoded code point.
    BsGetUtf {
        /// Encoding width.
        width: Utf,
        /// Decode-failure label.
        fail: Label,
        /// Match context.
        ctx: Operand,
        /// Live X registers.
        live: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Saves the current match position into a numbered slot.
    BsSave2 {
        /// Match context.
        ctx: Operand,
        /// Save slot.
        slot: u32,
    },
    /// Restores the match position from a previously saved slot.
    BsRestore2 {
        /// Match context.
        ctx: Operand,
        /// Save slot.
        slot: u32,
    },

    /// Allocates a fresh byte-aligned binary for construction.
    BsInit2 {
        /// Failure label.
        fail: Label,
        /// Byte size term.
        size: Operand,
        /// Extra heap words.
        words: u32,
        /// Live X registers.
        live: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Allocates a fresh bit-level binary for construction.
    BsInitBits {
        /// Failure label.
        fail: Label,
        /// Bit size term.
        size: Operand,
        /// Extra heap words.
        words: u32,
        /// Live X registers.
        live: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Appends to a binary, copying when necessary.
    BsAppend {
        /// Failure label.
        fail: Label,
        /// Appended bit size term.
        size: Operand,
        /// Extra heap words.
        extra: u32,
        /// Live X registers.
        live: u32,
        /// Size unit.
        unit: u32,
        /// Binary being appended to.
        src: Operand,
        /// Destination register.
        dst: Operand,
    },
    /// Appends to a binary known to be writable in place.
    BsPrivateAppend {
        /// Failure label.
        fail: Label,
        /// Appended bit size term.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Binary being appended to.
        src: Operand,
        /// Destination register.
        dst: Operand,
    },
    /// Writes an integer field into the binary under construction.
    BsPutInteger {
        /// Failure label.
        fail: Label,
        /// Bit count term.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Value term.
        src: Operand,
    },
    /// Writes a float field into the binary under construction.
    BsPutFloat {
        /// Failure label.
        fail: Label,
        /// Bit count term.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Value term.
        src: Operand,
    },
    /// Writes a binary field into the binary under construction.
    BsPutBinary {
        /// Failure label.
        fail: Label,
        /// Bit count term, or `{atom,all}`.
        size: Operand,
        /// Size unit.
        unit: u32,
        /// Value term.
        src: Operand,
    },
    /// Writes a UTF-encoded code point into the binary under construction.
    BsPutUtf {
        /// Encoding width.
        width: Utf,
        /// Failure label.
        fail: Label,
        /// Code point term.
        src: Operand,
    },
    /// Writes a literal string into the binary under construction.
    BsPutString {
        /// Bit length of the literal.
        bits: u64,
        /// Literal bytes.
        data: Vec<u8>,
    },
    /// Computes a field size product with overflow checking.
    BsAdd {
        /// Overflow label.
        fail: Label,
        /// First size term.
        a: Operand,
        /// Second size term.
        b: Operand,
        /// Unit multiplier for `b`.
        unit: u32,
        /// Destination register.
        dst: Operand,
    },
    /// Computes the encoded size of a code point (UTF-8 or UTF-16).
    BsUtfSize {
        /// Encoding width (`Utf32` is never emitted).
        width: Utf,
        /// Failure label.
        fail: Label,
        /// Code point term.
        src: Operand,
        /// Destination register.
        dst: Operand,
    },

    /// Inserts or updates map keys.
    PutMapAssoc {
        /// Failure label.
        fail: Label,
        /// Source map.
        src: Operand,
        /// Destination register.
        dst: Operand,
        /// Live X registers.
        live: u32,
        /// Alternating key/value operands.
        pairs: Vec<Operand>,
    },
    /// Updates map keys that must already be present.
    PutMapExact {
        /// Failure label.
        fail: Label,
        /// Source map.
        src: Operand,
        /// Destination register.
        dst: Operand,
        /// Live X registers.
        live: u32,
        /// Alternating key/value operands.
        pairs: Vec<Operand>,
    },
    /// Fetches map values; branches when any key is missing.
    GetMapElements {
        /// Missing-key label.
        fail: Label,
        /// Source map.
        src: Operand,
        /// Alternating key/destination operands.
        list: Vec<Operand>,
    },

    /// An opcode outside the built-in catalogue.
    Unknown {
        /// Opcode name.
        op: String,
        /// Raw operands.
        args: Vec<Operand>,
    },
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Operand]) -> fmt::Result {
    write!(f, "[")?;
    for (i, a) in args.iter().enumerate() {
        if i != 0 {
            write!(f, ",")?;
        }
        write!(f, "{a}")?;
    }
    write!(f, "]")
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label { lbl } => write!(f, "{{label,{}}}", lbl.0),
            Self::FuncInfo {
                module,
                name,
                arity,
            } => write!(f, "{{func_info,{module},{name},{arity}}}"),
            Self::Line { loc } => write!(f, "{{line,{loc}}}"),
            Self::Comment { text } => write!(f, "{{'%',{text}}}"),
            Self::Move { src, dst } => write!(f, "{{move,{src},{dst}}}"),
            Self::Init { y } => write!(f, "{{init,{y}}}"),
            Self::Kill { y } => write!(f, "{{kill,{y}}}"),
            Self::TestHeap { need, live } => write!(f, "{{test_heap,{need},{live}}}"),
            Self::PutList { head, tail, dst } => write!(f, "{{put_list,{head},{tail},{dst}}}"),
            Self::PutTuple { arity, dst } => write!(f, "{{put_tuple,{arity},{dst}}}"),
            Self::Put { src } => write!(f, "{{put,{src}}}"),
            Self::PutTuple2 { dst, elems } => {
                write!(f, "{{put_tuple2,{dst},")?;
                write_args(f, elems)?;
                write!(f, "}}")
            }
            Self::Trim { n, remaining } => write!(f, "{{trim,{n},{remaining}}}"),
            Self::Allocate { stack, live } => write!(f, "{{allocate,{stack},{live}}}"),
            Self::AllocateZero { stack, live } => write!(f, "{{allocate_zero,{stack},{live}}}"),
            Self::AllocateHeap { stack, heap, live } => {
                write!(f, "{{allocate_heap,{stack},{heap},{live}}}")
            }
            Self::AllocateHeapZero { stack, heap, live } => {
                write!(f, "{{allocate_heap_zero,{stack},{heap},{live}}}")
            }
            Self::Deallocate { n } => write!(f, "{{deallocate,{n}}}"),
            Self::Catch { dst, fail } => write!(f, "{{'catch',{dst},{fail}}}"),
            Self::CatchEnd { dst } => write!(f, "{{catch_end,{dst}}}"),
            Self::Try { dst, fail } => write!(f, "{{'try',{dst},{fail}}}"),
            Self::TryEnd { dst } => write!(f, "{{try_end,{dst}}}"),
            Self::TryCase { dst } => write!(f, "{{try_case,{dst}}}"),
            Self::GetTupleElement { src, index, dst } => {
                write!(f, "{{get_tuple_element,{src},{index},{dst}}}")
            }
            Self::GetList { src, hd, tl } => write!(f, "{{get_list,{src},{hd},{tl}}}"),
            Self::Jump { lbl } => write!(f, "{{jump,{lbl}}}"),
            Self::RecvMark { lbl } => write!(f, "{{recv_mark,{lbl}}}"),
            Self::RecvSet { lbl } => write!(f, "{{recv_set,{lbl}}}"),
            Self::Badmatch { src } => write!(f, "{{badmatch,{src}}}"),
            Self::CaseEnd { src } => write!(f, "{{case_end,{src}}}"),
            Self::TryCaseEnd { src } => write!(f, "{{try_case_end,{src}}}"),
            Self::IfEnd => write!(f, "if_end"),
            Self::BsContextToBinary { src } => write!(f, "{{bs_context_to_binary,{src}}}"),
            Self::Fconv { src, dst } => write!(f, "{{fconv,{src},{dst}}}"),
            Self::Fmove { src, dst } => write!(f, "{{fmove,{src},{dst}}}"),
            Self::Fclearerror => write!(f, "fclearerror"),
            Self::Fcheckerror { fail } => write!(f, "{{fcheckerror,{fail}}}"),
            Self::Call { arity, lbl } => write!(f, "{{call,{arity},{lbl}}}"),
            Self::CallLast {
                arity,
                lbl,
                dealloc,
            } => write!(f, "{{call_last,{arity},{lbl},{dealloc}}}"),
            Self::CallOnly { arity, lbl } => write!(f, "{{call_only,{arity},{lbl}}}"),
            Self::CallExt { arity, func } => write!(f, "{{call_ext,{arity},{func}}}"),
            Self::CallExtLast {
                arity,
                func,
                dealloc,
            } => write!(f, "{{call_ext_last,{arity},{func},{dealloc}}}"),
            Self::CallExtOnly { arity, func } => write!(f, "{{call_ext_only,{arity},{func}}}"),
            Self::CallFun { arity } => write!(f, "{{call_fun,{arity}}}"),
            Self::Apply { arity } => write!(f, "{{apply,{arity}}}"),
            Self::ApplyLast { arity, dealloc } => write!(f, "{{apply_last,{arity},{dealloc}}}"),
            Self::Bif {
                op,
                fail,
                args,
                dst,
            } => {
                write!(f, "{{bif,{op},{fail},")?;
                write_args(f, args)?;
                write!(f, ",{dst}}}")
            }
            Self::GcBif {
                op,
                fail,
                live,
                args,
                dst,
            } => {
                write!(f, "{{gc_bif,{op},{fail},{live},")?;
                write_args(f, args)?;
                write!(f, ",{dst}}}")
            }
            Self::Return => write!(f, "return"),
            Self::LoopRec { fail, dst } => write!(f, "{{loop_rec,{fail},{dst}}}"),
            Self::LoopRecEnd { lbl } => write!(f, "{{loop_rec_end,{lbl}}}"),
            Self::Wait { lbl } => write!(f, "{{wait,{lbl}}}"),
            Self::WaitTimeout { lbl, src } => write!(f, "{{wait_timeout,{lbl},{src}}}"),
            Self::Timeout => write!(f, "timeout"),
            Self::Send => write!(f, "send"),
            Self::RemoveMessage => write!(f, "remove_message"),
            Self::SetTupleElement { src, tuple, index } => {
                write!(f, "{{set_tuple_element,{src},{tuple},{index}}}")
            }
            Self::SelectVal { src, fail, list } => {
                write!(f, "{{select_val,{src},{fail},{{list,[")?;
                for (i, (v, l)) in list.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v},{l}")?;
                }
                write!(f, "]}}}}")
            }
            Self::SelectTupleArity { src, fail, list } => {
                write!(f, "{{select_tuple_arity,{src},{fail},{{list,[")?;
                for (i, (a, l)) in list.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{a},{l}")?;
                }
                write!(f, "]}}}}")
            }
            Self::Test { op, fail, args } => {
                write!(f, "{{test,{op},{fail},")?;
                write_args(f, args)?;
                write!(f, "}}")
            }
            Self::BsStartMatch2 {
                fail,
                live,
                src,
                slots,
                dst,
            } => write!(
                f,
                "{{test,bs_start_match2,{fail},[{src},{live},{slots},{dst}]}}"
            ),
            Self::BsMatchString {
                fail,
                ctx,
                bits,
                string,
            } => write!(
                f,
                "{{test,bs_match_string,{fail},[{ctx},{bits},<<{} bytes>>]}}",
                string.len()
            ),
            Self::BsSkipBits2 {
                fail,
                ctx,
                size,
                unit,
            } => write!(f, "{{test,bs_skip_bits2,{fail},[{ctx},{size},{unit}]}}"),
            Self::BsSkipUtf {
                width,
                fail,
                ctx,
                live,
            } => write!(
                f,
                "{{test,bs_skip_utf{},{fail},[{ctx},{live}]}}",
                width.digits()
            ),
            Self::BsTestTail2 { fail, ctx, bits } => {
                write!(f, "{{test,bs_test_tail2,{fail},[{ctx},{bits}]}}")
            }
            Self::BsTestUnit { fail, ctx, unit } => {
                write!(f, "{{test,bs_test_unit,{fail},[{ctx},{unit}]}}")
            }
            Self::BsGetInteger2 {
                fail,
                ctx,
                live,
                size,
                unit,
                dst,
            } => write!(
                f,
                "{{test,bs_get_integer2,{fail},[{ctx},{live},{size},{unit},{dst}]}}"
            ),
            Self::BsGetFloat2 {
                fail,
                ctx,
                live,
                size,
                unit,
                dst,
            } => write!(
                f,
                "{{test,bs_get_float2,{fail},[{ctx},{live},{size},{unit},{dst}]}}"
            ),
            Self::BsGetBinary2 {
                fail,
                ctx,
                live,
                size,
                unit,
                dst,
            } => write!(
                f,
                "{{test,bs_get_binary2,{fail},[{ctx},{live},{size},{unit},{dst}]}}"
            ),
            Self::BsGetUtf {
                width,
                fail,
                ctx,
                live,
                dst,
            } => write!(
                f,
                "{{test,bs_get_utf{},{fail},[{ctx},{live},{dst}]}}",
                width.digits()
            ),
            Self::BsSave2 { ctx, slot } => write!(f, "{{bs_save2,{ctx},{slot}}}"),
            Self::BsRestore2 { ctx, slot } => write!(f, "{{bs_restore2,{ctx},{slot}}}"),
            Self::BsInit2 {
                fail,
                size,
                words,
                live,
                dst,
            } => write!(f, "{{bs_init2,{fail},{size},{words},{live},{dst}}}"),
            Self::BsInitBits {
                fail,
                size,
                words,
                live,
                dst,
            } => write!(f, "{{bs_init_bits,{fail},{size},{words},{live},{dst}}}"),
            Self::BsAppend {
                fail,
                size,
                extra,
                live,
                unit,
                src,
                dst,
            } => write!(
                f,
                "{{bs_append,{fail},{size},{extra},{live},{unit},{src},{dst}}}"
            ),
            Self::BsPrivateAppend {
                fail,
                size,
                unit,
                src,
                dst,
            } => write!(f, "{{bs_private_append,{fail},{size},{unit},{src},{dst}}}"),
            Self::BsPutInteger {
                fail,
                size,
                unit,
                src,
            } => write!(f, "{{bs_put_integer,{fail},{size},{unit},{src}}}"),
            Self::BsPutFloat {
                fail,
                size,
                unit,
                src,
            } => write!(f, "{{bs_put_float,{fail},{size},{unit},{src}}}"),
            Self::BsPutBinary {
                fail,
                size,
                unit,
                src,
            } => write!(f, "{{bs_put_binary,{fail},{size},{unit},{src}}}"),
            Self::BsPutUtf { width, fail, src } => {
                write!(f, "{{bs_put_utf{},{fail},{src}}}", width.digits())
            }
            Self::BsPutString { bits, data } => {
                write!(f, "{{bs_put_string,{bits},<<{} bytes>>}}", data.len())
            }
            Self::BsAdd {
                fail,
                a,
                b,
                unit,
                dst,
            } => write!(f, "{{bs_add,{fail},[{a},{b},{unit}],{dst}}}"),
            Self::BsUtfSize {
                width,
                fail,
                src,
                dst,
            } => write!(f, "{{bs_utf{}_size,{fail},{src},{dst}}}", width.digits()),
            Self::PutMapAssoc {
                fail,
                src,
                dst,
                live,
                pairs,
            } => {
                write!(f, "{{put_map_assoc,{fail},{src},{dst},{live},")?;
                write_args(f, pairs)?;
                write!(f, "}}")
            }
            Self::PutMapExact {
                fail,
                src,
                dst,
                live,
                pairs,
            } => {
                write!(f, "{{put_map_exact,{fail},{src},{dst},{live},")?;
                write_args(f, pairs)?;
                write!(f, "}}")
            }
            Self::GetMapElements { fail, src, list } => {
                write!(f, "{{get_map_elements,{fail},{src},")?;
                write_args(f, list)?;
                write!(f, "}}")
            }
            Self::Unknown { op, args } => {
                write!(f, "{{{op},")?;
                write_args(f, args)?;
                write!(f, "}}")
            }
        }
    }
}
