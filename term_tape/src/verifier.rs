// Copyright 2026 the Term Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-function abstract interpreter.
//!
//! Verification rejects modules whose instruction stream could crash the
//! emulator or corrupt memory: reads of unwritten registers, broken stack
//! frame discipline, misuse of catch/try tags, GC-unsafe values in root
//! slots, malformed binary-match state, and so on. Ordinary type errors in
//! user code are deliberately let through; they raise clean run-time
//! exceptions.
//!
//! One abstract machine state is threaded through each function's
//! instructions in a single forward pass. Branches fork the state into a
//! per-label table where incoming edges are merged conservatively; a
//! violated invariant surfaces as one [`Diagnostic`] per failing function.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::diag::{Diagnostic, DiagnosticKind, ModuleError, Reason, Reg};
use crate::fregs::FregSet;
use crate::instr::{Alloc, ExtFunc, Instr, Operand};
use crate::program::{Function, Label, Mfa, Module};
use crate::types::{
    CtxIds, LabelSet, MatchCtx, TermType, TupleArity, Type, join, meet, union_labels,
};

/// Verifier configuration and implementation limits.
///
/// The defaults match the emulator: X register `1023` is reserved for the
/// loader, and the Y and float files hold `1024` slots.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    /// Highest usable X register index plus one.
    pub max_x_regs: u32,
    /// Highest usable Y register index plus one.
    pub max_y_regs: u32,
    /// Highest usable float register index plus one.
    pub max_fr_regs: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_x_regs: 1023,
            max_y_regs: 1024,
            max_fr_regs: 1024,
        }
    }
}

/// How an extension classifies an opcode outside the built-in catalogue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtOpKind {
    /// The opcode neither reads nor writes verifier-visible state.
    Nop,
    /// The opcode never falls through (it exits or transfers control).
    KillsState,
}

/// Teaches the verifier opcodes outside the built-in catalogue.
///
/// The built-in catalogue is always dispatched first; this hook only sees
/// instructions the verifier does not recognize. Unclaimed opcodes produce
/// an `unknown_instruction` diagnostic.
pub trait ExtOps {
    /// Classifies an unknown opcode; `None` means unrecognized.
    fn classify(&self, op: &str, args: &[Operand]) -> Option<ExtOpKind>;
}

struct NoExtOps;

impl ExtOps for NoExtOps {
    fn classify(&self, _op: &str, _args: &[Operand]) -> Option<ExtOpKind> {
        None
    }
}

/// A module that has been verified under a particular configuration.
///
/// This is an API affordance for embedders: an emulator entry point can
/// require a [`VerifiedModule`] and assume verifier-enforced invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedModule {
    module: Module,
}

impl VerifiedModule {
    /// Returns the underlying module.
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Consumes `self` and returns the underlying module.
    #[must_use]
    pub fn into_module(self) -> Module {
        self.module
    }
}

/// Verifies every function of `module`.
///
/// Verification never stops at the first bad function: the error carries
/// one diagnostic per failing function.
pub fn verify_module(module: &Module, cfg: &VerifyConfig) -> Result<(), ModuleError> {
    verify_module_with(module, cfg, &NoExtOps)
}

/// [`verify_module`] with an opcode extension hook.
pub fn verify_module_with(
    module: &Module,
    cfg: &VerifyConfig,
    ext: &dyn ExtOps,
) -> Result<(), ModuleError> {
    let ft = index_match_contexts(module);
    let mut diagnostics = Vec::new();
    for f in &module.functions {
        if let Some(d) = validate_function(module, f, &ft, cfg, ext) {
            diagnostics.push(d);
        }
    }
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(ModuleError {
            module: module.name.clone(),
            diagnostics,
        })
    }
}

/// Verifies `module` and returns a [`VerifiedModule`] wrapper on success.
pub fn verify_module_owned(
    module: Module,
    cfg: &VerifyConfig,
) -> Result<VerifiedModule, ModuleError> {
    verify_module(&module, cfg)?;
    Ok(VerifiedModule { module })
}

/// The floating-point error state machine.
///
/// Legal transitions are `undefined -> cleared -> checked -> cleared ...`;
/// float arithmetic is only legal while `cleared`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FloatState {
    /// No float block has started.
    Undefined,
    /// Inside a float block; deferred errors are armed.
    Cleared,
    /// The previous float block was checked.
    Checked,
}

impl fmt::Display for FloatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Cleared => write!(f, "cleared"),
            Self::Checked => write!(f, "checked"),
        }
    }
}

/// Stack frame size knowledge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// No frame has been allocated.
    None,
    /// Merged paths disagree on the frame size.
    Undecided,
    /// A frame of exactly this many slots.
    Size(u32),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Undecided => write!(f, "undecided"),
            Self::Size(n) => write!(f, "{n}"),
        }
    }
}

/// The enclosing catch/try handler stack, outermost first.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Ct {
    Stack(Vec<LabelSet>),
    Undecided,
}

/// What instruction defined a register, for local type refinement.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Def {
    /// `tuple_size(src)`.
    TupleSize(Reg),
    /// A boolean type test on `src` that implies the given type when true.
    TypeTest(Reg, TermType),
}

/// An open `put_tuple` fill.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PutsLeft {
    left: u32,
    dst: Reg,
    arity: u32,
    fragile: bool,
}

/// What the pre-scan learned about a function entry: the
/// `bs_start_match2` its body begins with.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BsmEntry {
    src: Operand,
    dst: Operand,
    slots: u32,
}

/// The abstract machine state on one branch.
#[derive(Clone, Debug, PartialEq, Eq)]
struct St {
    x: Vec<Option<Type>>,
    y: Vec<Type>,
    numy: Frame,
    f: FregSet,
    h: Option<u32>,
    hf: Option<u32>,
    fls: FloatState,
    ct: Ct,
    setelem: bool,
    puts_left: Option<PutsLeft>,
    defs: BTreeMap<Reg, Def>,
    aliases: BTreeMap<Reg, Reg>,
}

impl St {
    fn init(arity: u32) -> Self {
        Self {
            x: (0..arity).map(|_| Some(Type::any())).collect(),
            y: Vec::new(),
            numy: Frame::None,
            f: FregSet::new(),
            h: None,
            hf: None,
            fls: FloatState::Undefined,
            ct: Ct::Stack(Vec::new()),
            setelem: false,
            puts_left: None,
            defs: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }
}

enum Flow {
    Continue,
    Kill,
}

struct Vst<'a> {
    current: Option<St>,
    branched: BTreeMap<Label, St>,
    defined: BTreeSet<Label>,
    ids: CtxIds,
    cfg: &'a VerifyConfig,
    ft: &'a BTreeMap<Label, BsmEntry>,
}

impl Vst<'_> {
    /// Records `st` as flowing into `lbl`. A branch to label 0 means "raise
    /// here": the state is checked for GC safety and left unchanged.
    fn branch(&mut self, lbl: Label, st: &St) -> Result<(), Reason> {
        if lbl == Label::FAIL {
            return verify_y_init(st);
        }
        let merged = match self.branched.remove(&lbl) {
            Some(prev) => merge_states(&prev, st, &mut self.ids),
            None => st.clone(),
        };
        self.branched.insert(lbl, merged);
        Ok(())
    }
}

/// Builds the cross-function index of match-context start instructions.
///
/// For each function, the first real instruction after the entry label is
/// recorded when it is a `bs_start_match2`. One historical code-generator
/// pattern is tolerated: a `test` that branches to `fail`, immediately
/// followed by `bs_context_to_binary`, continues the scan at `fail`.
fn index_match_contexts(module: &Module) -> BTreeMap<Label, BsmEntry> {
    let mut ft = BTreeMap::new();
    for f in &module.functions {
        let mut labels: BTreeMap<Label, usize> = BTreeMap::new();
        for (i, ins) in f.code.iter().enumerate() {
            if let Instr::Label { lbl } = ins {
                labels.entry(*lbl).or_insert(i);
            }
        }
        let Some(&start) = labels.get(&f.entry) else {
            continue;
        };
        let mut i = start + 1;
        let mut visited: BTreeSet<Label> = BTreeSet::new();
        visited.insert(f.entry);
        loop {
            match f.code.get(i) {
                Some(Instr::Label { lbl }) if *lbl == f.entry => i += 1,
                Some(Instr::Line { .. }) => i += 1,
                Some(Instr::BsStartMatch2 {
                    src, slots, dst, ..
                }) => {
                    ft.insert(
                        f.entry,
                        BsmEntry {
                            src: src.clone(),
                            dst: dst.clone(),
                            slots: *slots,
                        },
                    );
                    break;
                }
                Some(Instr::Test { fail, .. })
                    if matches!(f.code.get(i + 1), Some(Instr::BsContextToBinary { .. })) =>
                {
                    match labels.get(fail) {
                        Some(&pos) if visited.insert(*fail) => i = pos + 1,
                        _ => break,
                    }
                }
                _ => break,
            }
        }
    }
    ft
}

fn validate_function(
    module: &Module,
    f: &Function,
    ft: &BTreeMap<Label, BsmEntry>,
    cfg: &VerifyConfig,
    ext: &dyn ExtOps,
) -> Option<Diagnostic> {
    let mfa = Mfa {
        module: module.name.clone(),
        name: f.name.clone(),
        arity: f.arity,
    };
    let diag = |instr: &Instr, offset: usize, reason: Reason| {
        Some(Diagnostic {
            mfa: mfa.clone(),
            kind: DiagnosticKind::Instr {
                instr: instr.clone(),
                offset,
                reason,
            },
        })
    };

    // Function header: leading labels, one func_info, more labels; the
    // declared entry label must be among the second run.
    let mut i = 0;
    let mut ls1: Vec<Label> = Vec::new();
    while let Some(Instr::Label { lbl }) = f.code.get(i) {
        ls1.push(*lbl);
        i += 1;
    }
    let header = Instr::FuncInfo {
        module: module.name.clone(),
        name: f.name.clone(),
        arity: f.arity,
    };
    match f.code.get(i) {
        Some(Instr::FuncInfo { .. }) => {}
        other => {
            let instr = other.cloned().unwrap_or_else(|| header.clone());
            return diag(&instr, i, Reason::IllegalInstruction);
        }
    }
    let fi_offset = i;
    i += 1;
    let mut ls2: Vec<Label> = Vec::new();
    while let Some(Instr::Label { lbl }) = f.code.get(i) {
        ls2.push(*lbl);
        i += 1;
    }
    if !ls2.contains(&f.entry) {
        return diag(&header, fi_offset, Reason::NoEntryLabel(f.entry));
    }

    let mut vst = Vst {
        current: Some(St::init(f.arity)),
        branched: BTreeMap::new(),
        defined: BTreeSet::new(),
        ids: CtxIds::default(),
        cfg,
        ft,
    };
    for l in &ls1 {
        vst.defined.insert(*l);
    }
    for l in &ls2 {
        vst.defined.insert(*l);
        if let Some(st) = &vst.current {
            vst.branched.insert(*l, st.clone());
        }
    }

    let body_start = i;
    for (offset, instr) in f.code.iter().enumerate().skip(body_start) {
        if let Err(reason) = validate_instr(&mut vst, instr, ext) {
            return diag(instr, offset, reason);
        }
    }

    // Falling off the end of the instruction stream is never legal.
    if vst.current.is_some() {
        let offset = f.code.len().saturating_sub(1);
        let instr = f.code.last().cloned().unwrap_or_else(|| header.clone());
        return diag(&instr, offset, Reason::IllegalInstruction);
    }

    // Branches back to the pre-header labels reach the generic entry stub:
    // they must carry no frame and intact argument registers.
    for l in &ls1 {
        let Some(st) = vst.branched.get(l) else {
            continue;
        };
        if st.numy != Frame::None {
            return diag(&header, fi_offset, Reason::Allocated(st.numy));
        }
        for n in 0..f.arity {
            match st.x.get(n as usize) {
                Some(Some(t)) if !matches!(t, Type::Uninitialized) => {}
                _ => return diag(&header, fi_offset, Reason::UninitializedReg(Reg::X(n))),
            }
        }
    }

    let undef: Vec<Label> = vst
        .branched
        .keys()
        .filter(|l| !vst.defined.contains(*l))
        .copied()
        .collect();
    if !undef.is_empty() {
        return Some(Diagnostic {
            mfa,
            kind: DiagnosticKind::UndefLabels { labels: undef },
        });
    }
    None
}

fn validate_instr(vst: &mut Vst<'_>, instr: &Instr, ext: &dyn ExtOps) -> Result<(), Reason> {
    if let Instr::Label { lbl } = instr {
        if let Some(st) = &vst.current
            && st.puts_left.is_some()
        {
            return Err(Reason::NotBuildingATuple);
        }
        vst.defined.insert(*lbl);
        let merged = match (vst.current.take(), vst.branched.remove(lbl)) {
            (Some(cur), Some(prev)) => Some(merge_states(&prev, &cur, &mut vst.ids)),
            (Some(cur), None) => Some(cur),
            (None, Some(prev)) => Some(prev),
            (None, None) => None,
        };
        if let Some(m) = &merged {
            vst.branched.insert(*lbl, m.clone());
        }
        vst.current = merged;
        return Ok(());
    }

    // Dead code: everything up to the next label is skipped.
    let Some(mut st) = vst.current.take() else {
        return Ok(());
    };

    if st.puts_left.is_some()
        && !matches!(
            instr,
            Instr::Put { .. } | Instr::Line { .. } | Instr::Comment { .. }
        )
    {
        vst.current = Some(st);
        return Err(Reason::NotBuildingATuple);
    }

    match step(vst, &mut st, instr, ext) {
        Ok(Flow::Continue) => {
            st.setelem = next_setelem(instr, st.setelem);
            vst.current = Some(st);
            Ok(())
        }
        Ok(Flow::Kill) => {
            vst.current = None;
            Ok(())
        }
        Err(e) => {
            vst.current = Some(st);
            Err(e)
        }
    }
}

/// The `setelem` flag is armed only by `erlang:setelement/3` and survives
/// only line noise and further `set_tuple_element` instructions.
fn next_setelem(instr: &Instr, prev: bool) -> bool {
    match instr {
        Instr::CallExt { func, .. } => {
            func.module == "erlang" && func.name == "setelement" && func.arity == 3
        }
        Instr::Line { .. } | Instr::Comment { .. } | Instr::SetTupleElement { .. } => prev,
        _ => false,
    }
}

/// Merges two states at a control-flow join.
fn merge_states(a: &St, b: &St, ids: &mut CtxIds) -> St {
    let xn = a.x.len().min(b.x.len());
    let x = (0..xn)
        .map(|i| match (&a.x[i], &b.x[i]) {
            (Some(ta), Some(tb)) => Some(join(ta, tb, ids)),
            _ => None,
        })
        .collect();
    let yn = a.y.len().min(b.y.len());
    let y = (0..yn).map(|i| join(&a.y[i], &b.y[i], ids)).collect();
    let numy = if a.numy == b.numy {
        a.numy
    } else {
        Frame::Undecided
    };
    let mut f = a.f;
    f.intersect_with(&b.f);
    let ct = match (&a.ct, &b.ct) {
        (Ct::Stack(sa), Ct::Stack(sb)) if sa.len() == sb.len() => Ct::Stack(
            sa.iter()
                .zip(sb.iter())
                .map(|(la, lb)| union_labels(la, lb))
                .collect(),
        ),
        _ => Ct::Undecided,
    };
    let defs = a
        .defs
        .iter()
        .filter(|&(r, d)| b.defs.get(r) == Some(d))
        .map(|(r, d)| (*r, d.clone()))
        .collect();
    let aliases = a
        .aliases
        .iter()
        .filter(|&(r, o)| b.aliases.get(r) == Some(o))
        .map(|(r, o)| (*r, *o))
        .collect();
    St {
        x,
        y,
        numy,
        f,
        h: merge_heap(a.h, b.h),
        hf: merge_heap(a.hf, b.hf),
        fls: if a.fls == b.fls {
            a.fls
        } else {
            FloatState::Undefined
        },
        ct,
        setelem: a.setelem && b.setelem,
        puts_left: if a.puts_left == b.puts_left {
            a.puts_left.clone()
        } else {
            None
        },
        defs,
        aliases,
    }
}

/// `None` is "no active reservation"; a join takes the tighter side.
fn merge_heap(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

fn as_reg(op: &Operand) -> Option<Reg> {
    match op {
        Operand::X(n) => Some(Reg::X(*n)),
        Operand::Y(n) => Some(Reg::Y(*n)),
        _ => None,
    }
}

/// Reads a register's raw slot type, checking limits and definedness.
fn read_reg<'a>(cfg: &VerifyConfig, st: &'a St, op: &Operand) -> Result<&'a Type, Reason> {
    match op {
        Operand::X(n) => {
            if *n >= cfg.max_x_regs {
                return Err(Reason::Limit);
            }
            match st.x.get(*n as usize) {
                Some(Some(t)) => Ok(t),
                _ => Err(Reason::UninitializedReg(Reg::X(*n))),
            }
        }
        Operand::Y(n) => {
            if *n >= cfg.max_y_regs {
                return Err(Reason::Limit);
            }
            match st.y.get(*n as usize) {
                Some(t) => Ok(t),
                None => Err(Reason::UninitializedReg(Reg::Y(*n))),
            }
        }
        _ => Err(Reason::BadSource(op.clone())),
    }
}

/// Reads an operand as a term; match contexts and other markers are
/// rejected. Returns the term type and its fragility.
fn read_term(cfg: &VerifyConfig, st: &St, op: &Operand) -> Result<(TermType, bool), Reason> {
    match op {
        Operand::Atom(a) => Ok((TermType::Atom(Some(a.clone())), false)),
        Operand::Integer(i) => Ok((TermType::Integer(Some(*i)), false)),
        Operand::Float(x) => Ok((TermType::Float(Some(*x)), false)),
        Operand::Nil => Ok((TermType::Nil, false)),
        Operand::Literal(l) => Ok((TermType::Literal(l.clone()), false)),
        Operand::X(_) | Operand::Y(_) => match read_reg(cfg, st, op)? {
            Type::Term { ty, fragile } => Ok((ty.clone(), *fragile)),
            Type::Uninitialized => Err(match op {
                Operand::X(n) => Reason::UninitializedReg(Reg::X(*n)),
                _ => Reason::UninitializedReg(Reg::Y(y_index(op))),
            }),
            Type::CatchTag(ls) => Err(Reason::Catchtag(ls.clone())),
            Type::TryTag(ls) => Err(Reason::Trytag(ls.clone())),
            Type::MatchContext(_) => Err(Reason::MatchContext(reg_or_x0(op))),
            Type::TupleInProgress => Err(Reason::TupleInProgress),
            t => Err(Reason::BadType(t.clone())),
        },
        _ => Err(Reason::BadSource(op.clone())),
    }
}

fn y_index(op: &Operand) -> u32 {
    match op {
        Operand::Y(n) => *n,
        _ => 0,
    }
}

fn reg_or_x0(op: &Operand) -> Reg {
    as_reg(op).unwrap_or(Reg::X(0))
}

/// Reads an operand as a move source: like [`read_term`], but match
/// contexts move freely between registers.
fn read_any(cfg: &VerifyConfig, st: &St, op: &Operand) -> Result<Type, Reason> {
    match op {
        Operand::X(_) | Operand::Y(_) => match read_reg(cfg, st, op)? {
            t @ (Type::Term { .. } | Type::MatchContext(_)) => Ok(t.clone()),
            Type::Uninitialized => Err(Reason::UninitializedReg(reg_or_x0(op))),
            Type::CatchTag(ls) => Err(Reason::Catchtag(ls.clone())),
            Type::TryTag(ls) => Err(Reason::Trytag(ls.clone())),
            Type::TupleInProgress => Err(Reason::TupleInProgress),
            t => Err(Reason::BadType(t.clone())),
        },
        _ => {
            let (ty, fragile) = read_term(cfg, st, op)?;
            Ok(Type::Term { ty, fragile })
        }
    }
}

fn break_links(st: &mut St, r: Reg) {
    st.defs.remove(&r);
    if let Some(o) = st.aliases.remove(&r) {
        st.aliases.remove(&o);
    }
}

fn add_alias(st: &mut St, a: Reg, b: Reg) {
    st.aliases.insert(a, b);
    st.aliases.insert(b, a);
}

/// Writes `ty` into a register, enforcing limits, frame discipline, the
/// fragility rule for Y slots, and tag protection.
fn set_reg(cfg: &VerifyConfig, st: &mut St, op: &Operand, ty: Type) -> Result<(), Reason> {
    match op {
        Operand::X(n) => {
            if *n >= cfg.max_x_regs {
                return Err(Reason::Limit);
            }
            let idx = *n as usize;
            if idx >= st.x.len() {
                st.x.resize(idx + 1, None);
            }
            break_links(st, Reg::X(*n));
            st.x[idx] = Some(ty);
            Ok(())
        }
        Operand::Y(n) => {
            if *n >= cfg.max_y_regs {
                return Err(Reason::Limit);
            }
            if let Type::Term { fragile: true, .. } = ty {
                return Err(Reason::FragileMessageReference(Reg::Y(*n)));
            }
            let size = match st.numy {
                Frame::None => return Err(Reason::StackFrame(Frame::None)),
                Frame::Undecided => return Err(Reason::UnknownSizeOfStackframe),
                Frame::Size(s) => s,
            };
            if *n >= size {
                return Err(Reason::StackFrame(Frame::Size(size)));
            }
            match &st.y[*n as usize] {
                Type::CatchTag(ls) => return Err(Reason::Catchtag(ls.clone())),
                Type::TryTag(ls) => return Err(Reason::Trytag(ls.clone())),
                _ => {}
            }
            break_links(st, Reg::Y(*n));
            st.y[*n as usize] = ty;
            Ok(())
        }
        other => Err(Reason::InvalidStore(other.clone())),
    }
}

/// Checks that `x0..live-1` are populated.
fn verify_live(cfg: &VerifyConfig, st: &St, live: u32) -> Result<(), Reason> {
    if live > cfg.max_x_regs {
        return Err(Reason::BadNumberOfLiveRegs(live));
    }
    for n in 0..live {
        match st.x.get(n as usize) {
            Some(Some(_)) => {}
            _ => return Err(Reason::NotLive(Reg::X(n))),
        }
    }
    Ok(())
}

/// Checks that no Y slot is uninitialized (garbage collection walks the
/// whole frame). Tags are GC-safe.
fn verify_y_init(st: &St) -> Result<(), Reason> {
    for (n, t) in st.y.iter().enumerate() {
        if *t == Type::Uninitialized {
            return Err(Reason::UninitializedReg(Reg::Y(n as u32)));
        }
    }
    Ok(())
}

fn verify_no_ct(st: &St) -> Result<(), Reason> {
    match &st.ct {
        Ct::Undecided => Err(Reason::AmbiguousCatchTryState),
        Ct::Stack(s) if !s.is_empty() => Err(Reason::UnfinishedCatchTry),
        Ct::Stack(_) => Ok(()),
    }
}

/// Drops X registers at or above `live`, as a garbage collection does.
fn prune_x(st: &mut St, live: u32) {
    if (live as usize) < st.x.len() {
        st.x.truncate(live as usize);
    }
    let dead = |r: &Reg| matches!(r, Reg::X(n) if *n >= live);
    st.defs.retain(|r, d| {
        !dead(r)
            && match d {
                Def::TupleSize(s) | Def::TypeTest(s, _) => !dead(s),
            }
    });
    st.aliases.retain(|r, o| !dead(r) && !dead(o));
}

fn drop_y_links(st: &mut St) {
    let is_y = |r: &Reg| matches!(r, Reg::Y(_));
    st.defs.retain(|r, d| {
        !is_y(r)
            && match d {
                Def::TupleSize(s) | Def::TypeTest(s, _) => !is_y(s),
            }
    });
    st.aliases.retain(|r, o| !is_y(r) && !is_y(o));
}

fn kill_heap(st: &mut St) {
    st.h = None;
    st.hf = None;
}

fn eat_heap(st: &mut St, need: u32) -> Result<(), Reason> {
    if let Some(left) = st.h {
        if left < need {
            return Err(Reason::HeapOverflow { left, need });
        }
        st.h = Some(left - need);
    }
    Ok(())
}

fn eat_float_heap(st: &mut St, need: u32) -> Result<(), Reason> {
    if let Some(left) = st.hf {
        if left < need {
            return Err(Reason::HeapOverflow { left, need });
        }
        st.hf = Some(left - need);
    }
    Ok(())
}

fn set_heap(st: &mut St, alloc: Alloc) {
    match alloc {
        Alloc::Words(w) => {
            st.h = Some(w);
            st.hf = Some(0);
        }
        Alloc::Mixed { words, floats } => {
            st.h = Some(words);
            st.hf = Some(floats);
        }
    }
}

/// Narrows a register (and its alias) to the meet of its current type and
/// `tt`. Returns `false` when the meet is empty, i.e. this path is
/// impossible.
fn refine_to(st: &mut St, r: Reg, tt: &TermType) -> bool {
    let regs = [Some(r), st.aliases.get(&r).copied()];
    for r in regs.into_iter().flatten() {
        let slot = match r {
            Reg::X(n) => st.x.get_mut(n as usize).and_then(|s| s.as_mut()),
            Reg::Y(n) => st.y.get_mut(n as usize),
            Reg::Fr(_) => None,
        };
        if let Some(Type::Term { ty, .. }) = slot {
            match meet(ty, tt) {
                Some(m) => *ty = m,
                None => return false,
            }
        }
    }
    true
}

/// Narrows a source operand on a fall-through path; a failed meet is a
/// type-precondition violation.
fn refine_operand(st: &mut St, op: &Operand, tt: &TermType) -> Result<(), Reason> {
    if let Some(r) = as_reg(op)
        && !refine_to(st, r, tt)
    {
        if let Ok(t) = read_reg_owned(st, r) {
            return Err(Reason::BadType(t));
        }
        return Err(Reason::BadType(Type::any()));
    }
    Ok(())
}

fn read_reg_owned(st: &St, r: Reg) -> Result<Type, ()> {
    match r {
        Reg::X(n) => st.x.get(n as usize).cloned().flatten().ok_or(()),
        Reg::Y(n) => st.y.get(n as usize).cloned().ok_or(()),
        Reg::Fr(_) => Err(()),
    }
}

fn active_tag_slots(st: &St) -> Vec<u32> {
    st.y
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_tag())
        .map(|(n, _)| n as u32)
        .collect()
}

fn reg_operand(r: Reg) -> Operand {
    match r {
        Reg::X(n) => Operand::X(n),
        Reg::Y(n) => Operand::Y(n),
        Reg::Fr(n) => Operand::Fr(n),
    }
}

fn step(
    vst: &mut Vst<'_>,
    st: &mut St,
    instr: &Instr,
    ext: &dyn ExtOps,
) -> Result<Flow, Reason> {
    if let Some(flow) = valfun_1(vst, st, instr)? {
        return Ok(flow);
    }

    // Anything below can raise: fork the state into the innermost handler
    // so the handler label sees every raise site.
    match &st.ct {
        Ct::Undecided => return Err(Reason::AmbiguousCatchTryState),
        Ct::Stack(stack) => {
            if let Some(top) = stack.last() {
                if let [fail] = top.as_slice() {
                    let fail = *fail;
                    vst.branch(fail, st)?;
                } else {
                    return Err(Reason::UnknownCatchTryState);
                }
            }
        }
    }

    if let Some(flow) = valfun_3(vst, st, instr)? {
        return Ok(flow);
    }
    // Only float opcodes may run while deferred float errors are armed.
    if st.fls == FloatState::Cleared {
        return Err(Reason::UnsafeInstruction);
    }

    valfun_4(vst, st, instr, ext)
}

/// Tier 1: instructions that can never raise at run time.
fn valfun_1(vst: &mut Vst<'_>, st: &mut St, instr: &Instr) -> Result<Option<Flow>, Reason> {
    let cfg = vst.cfg;
    let flow = match instr {
        Instr::Line { .. } | Instr::Comment { .. } => Flow::Continue,
        // A func_info in the body is the function-clause failure stub.
        Instr::FuncInfo { .. } => Flow::Kill,
        Instr::Badmatch { src } | Instr::CaseEnd { src } | Instr::TryCaseEnd { src } => {
            read_term(cfg, st, src)?;
            verify_y_init(st)?;
            Flow::Kill
        }
        Instr::IfEnd => {
            verify_y_init(st)?;
            Flow::Kill
        }
        Instr::BsContextToBinary { src } => {
            if as_reg(src).is_none() {
                return Err(Reason::BadSource(src.clone()));
            }
            if let Type::MatchContext(_) = read_any(cfg, st, src)? {
                set_reg(cfg, st, src, Type::term(TermType::Binary))?;
            }
            Flow::Continue
        }
        Instr::Move { src, dst } => {
            let ty = read_any(cfg, st, src)?;
            set_reg(cfg, st, dst, ty)?;
            if let (Some(s), Some(d)) = (as_reg(src), as_reg(dst))
                && s != d
            {
                add_alias(st, s, d);
            }
            Flow::Continue
        }
        Instr::Init { y } | Instr::Kill { y } => {
            if !matches!(y, Operand::Y(_)) {
                return Err(Reason::InvalidStore(y.clone()));
            }
            set_reg(cfg, st, y, Type::Initialized)?;
            Flow::Continue
        }
        Instr::Fconv { src, dst } => {
            let Operand::Fr(n) = dst else {
                return Err(Reason::InvalidStore(dst.clone()));
            };
            if *n >= cfg.max_fr_regs {
                return Err(Reason::Limit);
            }
            let (ty, _) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Number).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            refine_operand(st, src, &TermType::Number)?;
            st.f.set(*n);
            Flow::Continue
        }
        Instr::Fmove { src, dst } => match (src, dst) {
            (Operand::Fr(n), d) if !matches!(d, Operand::Fr(_)) => {
                if *n >= cfg.max_fr_regs {
                    return Err(Reason::Limit);
                }
                if !st.f.get(*n) {
                    return Err(Reason::UninitializedReg(Reg::Fr(*n)));
                }
                eat_float_heap(st, 1)?;
                set_reg(cfg, st, d, Type::term(TermType::Float(None)))?;
                Flow::Continue
            }
            (s, Operand::Fr(n)) if !matches!(s, Operand::Fr(_)) => {
                if *n >= cfg.max_fr_regs {
                    return Err(Reason::Limit);
                }
                let (ty, _) = read_term(cfg, st, s)?;
                if meet(&ty, &TermType::Float(None)).is_none() {
                    return Err(Reason::BadType(Type::term(ty)));
                }
                refine_operand(st, s, &TermType::Float(None))?;
                st.f.set(*n);
                Flow::Continue
            }
            _ => return Err(Reason::IllegalInstruction),
        },
        Instr::TestHeap { need, live } => {
            verify_live(cfg, st, *live)?;
            verify_y_init(st)?;
            prune_x(st, *live);
            set_heap(st, *need);
            Flow::Continue
        }
        Instr::PutList { head, tail, dst } => {
            eat_heap(st, 2)?;
            let (_, hf) = read_term(cfg, st, head)?;
            let (_, tf) = read_term(cfg, st, tail)?;
            set_reg(
                cfg,
                st,
                dst,
                Type::Term {
                    ty: TermType::Cons,
                    fragile: hf || tf,
                },
            )?;
            Flow::Continue
        }
        Instr::PutTuple { arity, dst } => {
            eat_heap(st, 1)?;
            let Some(dreg) = as_reg(dst) else {
                return Err(Reason::InvalidStore(dst.clone()));
            };
            set_reg(cfg, st, dst, Type::TupleInProgress)?;
            if *arity == 0 {
                set_reg(cfg, st, dst, Type::term(TermType::Tuple(TupleArity::Exact(0))))?;
            } else {
                st.puts_left = Some(PutsLeft {
                    left: *arity,
                    dst: dreg,
                    arity: *arity,
                    fragile: false,
                });
            }
            Flow::Continue
        }
        Instr::Put { src } => {
            let Some(mut pl) = st.puts_left.take() else {
                return Err(Reason::NotBuildingATuple);
            };
            let (_, fragile) = read_term(cfg, st, src)?;
            eat_heap(st, 1)?;
            pl.fragile |= fragile;
            pl.left -= 1;
            if pl.left == 0 {
                let dst = reg_operand(pl.dst);
                set_reg(
                    cfg,
                    st,
                    &dst,
                    Type::Term {
                        ty: TermType::Tuple(TupleArity::Exact(pl.arity)),
                        fragile: pl.fragile,
                    },
                )?;
            } else {
                st.puts_left = Some(pl);
            }
            Flow::Continue
        }
        Instr::PutTuple2 { dst, elems } => {
            eat_heap(st, elems.len() as u32 + 1)?;
            let mut fragile = false;
            for e in elems {
                let (_, ef) = read_term(cfg, st, e)?;
                fragile |= ef;
            }
            set_reg(
                cfg,
                st,
                dst,
                Type::Term {
                    ty: TermType::Tuple(TupleArity::Exact(elems.len() as u32)),
                    fragile,
                },
            )?;
            Flow::Continue
        }
        Instr::Trim { n, remaining } => {
            let size = match st.numy {
                Frame::Size(s) => s,
                Frame::Undecided => return Err(Reason::UnknownSizeOfStackframe),
                Frame::None => {
                    return Err(Reason::Trim {
                        n: *n,
                        frame: Frame::None,
                    });
                }
            };
            if n.checked_add(*remaining) != Some(size) {
                return Err(Reason::Trim {
                    n: *n,
                    frame: Frame::Size(size),
                });
            }
            if st.y[..*n as usize].iter().any(Type::is_tag) {
                return Err(Reason::UnfinishedCatchTry);
            }
            st.y.drain(..*n as usize);
            st.numy = Frame::Size(*remaining);
            drop_y_links(st);
            Flow::Continue
        }
        Instr::Allocate { stack, live } => {
            do_allocate(cfg, st, *stack, *live, false, None)?;
            Flow::Continue
        }
        Instr::AllocateZero { stack, live } => {
            do_allocate(cfg, st, *stack, *live, true, None)?;
            Flow::Continue
        }
        Instr::AllocateHeap { stack, heap, live } => {
            do_allocate(cfg, st, *stack, *live, false, Some(*heap))?;
            Flow::Continue
        }
        Instr::AllocateHeapZero { stack, heap, live } => {
            do_allocate(cfg, st, *stack, *live, true, Some(*heap))?;
            Flow::Continue
        }
        Instr::Deallocate { n } => {
            match st.numy {
                Frame::Size(s) if s == *n => {}
                other => return Err(Reason::StackFrame(other)),
            }
            verify_no_ct(st)?;
            for t in &st.y {
                if t.is_tag() {
                    return Err(Reason::UnfinishedCatchTry);
                }
                if *t == Type::Uninitialized {
                    return Err(Reason::StackFrame(Frame::Size(*n)));
                }
            }
            st.y.clear();
            st.numy = Frame::None;
            drop_y_links(st);
            Flow::Continue
        }
        Instr::Catch { dst, fail } => {
            do_catch(vst, st, dst, *fail, true)?;
            Flow::Continue
        }
        Instr::Try { dst, fail } => {
            do_catch(vst, st, dst, *fail, false)?;
            Flow::Continue
        }
        Instr::CatchEnd { dst } => {
            dispose_tag(cfg, st, dst, true)?;
            prune_x(st, 0);
            set_reg(cfg, st, &Operand::X(0), Type::any())?;
            Flow::Continue
        }
        Instr::TryEnd { dst } => {
            dispose_tag(cfg, st, dst, false)?;
            Flow::Continue
        }
        Instr::TryCase { dst } => {
            dispose_tag(cfg, st, dst, false)?;
            prune_x(st, 0);
            set_reg(cfg, st, &Operand::X(0), Type::term(TermType::Atom(None)))?;
            set_reg(cfg, st, &Operand::X(1), Type::any())?;
            set_reg(cfg, st, &Operand::X(2), Type::any())?;
            Flow::Continue
        }
        Instr::GetTupleElement { src, index, dst } => {
            let (ty, fragile) = read_term(cfg, st, src)?;
            let want = TermType::Tuple(TupleArity::AtLeast(index + 1));
            if meet(&ty, &want).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            refine_operand(st, src, &want)?;
            set_reg(
                cfg,
                st,
                dst,
                Type::Term {
                    ty: TermType::Any,
                    fragile,
                },
            )?;
            Flow::Continue
        }
        Instr::GetList { src, hd, tl } => {
            let (ty, fragile) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Cons).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            refine_operand(st, src, &TermType::Cons)?;
            set_reg(
                cfg,
                st,
                hd,
                Type::Term {
                    ty: TermType::Any,
                    fragile,
                },
            )?;
            set_reg(
                cfg,
                st,
                tl,
                Type::Term {
                    ty: TermType::Any,
                    fragile,
                },
            )?;
            Flow::Continue
        }
        Instr::Jump { lbl } => {
            vst.branch(*lbl, st)?;
            Flow::Kill
        }
        Instr::RecvMark { .. } | Instr::RecvSet { .. } => Flow::Continue,
        Instr::Bif {
            op,
            fail,
            args,
            dst,
        } if *fail == Label::FAIL && is_pure_bif(op, args.len()) => {
            for a in args {
                read_term(cfg, st, a)?;
            }
            let ret = bif_type(op, args.len());
            set_reg(cfg, st, dst, Type::term(ret))?;
            if let (Some(dreg), Some(arg)) = (as_reg(dst), args.first())
                && let (Some(areg), Some(tt)) = (as_reg(arg), type_test_implication(op))
            {
                st.defs.insert(dreg, Def::TypeTest(areg, tt));
            }
            Flow::Continue
        }
        _ => return Ok(None),
    };
    Ok(Some(flow))
}

fn do_allocate(
    cfg: &VerifyConfig,
    st: &mut St,
    stack: u32,
    live: u32,
    zero: bool,
    heap: Option<Alloc>,
) -> Result<(), Reason> {
    if st.numy != Frame::None {
        return Err(Reason::ExistingStackFrame);
    }
    if stack > cfg.max_y_regs {
        return Err(Reason::Limit);
    }
    verify_live(cfg, st, live)?;
    prune_x(st, live);
    let slot = if zero {
        Type::Initialized
    } else {
        Type::Uninitialized
    };
    st.y = vec![slot; stack as usize];
    st.numy = Frame::Size(stack);
    if let Some(a) = heap {
        set_heap(st, a);
    }
    Ok(())
}

fn do_catch(
    vst: &mut Vst<'_>,
    st: &mut St,
    dst: &Operand,
    fail: Label,
    is_catch: bool,
) -> Result<(), Reason> {
    let cfg = vst.cfg;
    if fail == Label::FAIL {
        return Err(Reason::IllegalInstruction);
    }
    let Operand::Y(n) = dst else {
        return Err(Reason::InvalidStore(dst.clone()));
    };
    if *n >= cfg.max_y_regs {
        return Err(Reason::Limit);
    }
    let size = match st.numy {
        Frame::Size(s) => s,
        Frame::None => return Err(Reason::StackFrame(Frame::None)),
        Frame::Undecided => return Err(Reason::UnknownSizeOfStackframe),
    };
    if *n >= size {
        return Err(Reason::StackFrame(Frame::Size(size)));
    }
    // A new tag must sit above every enclosing tag so the innermost one is
    // always found first.
    let active = active_tag_slots(st);
    if active.iter().any(|&s| s >= *n) {
        return Err(Reason::BadTryCatchNesting {
            tag: Reg::Y(*n),
            active,
        });
    }
    if !matches!(st.ct, Ct::Stack(_)) {
        return Err(Reason::AmbiguousCatchTryState);
    }
    break_links(st, Reg::Y(*n));
    let tag = vec![fail];
    st.y[*n as usize] = if is_catch {
        Type::CatchTag(tag.clone())
    } else {
        Type::TryTag(tag.clone())
    };
    if let Ct::Stack(stack) = &mut st.ct {
        stack.push(tag);
    }
    // The runtime guarantees a well-formed frame at the handler.
    let mut handler = st.clone();
    for slot in &mut handler.y {
        if *slot == Type::Uninitialized {
            *slot = Type::any();
        }
    }
    vst.branch(fail, &handler)
}

fn dispose_tag(
    cfg: &VerifyConfig,
    st: &mut St,
    dst: &Operand,
    want_catch: bool,
) -> Result<(), Reason> {
    let Operand::Y(n) = dst else {
        return Err(Reason::InvalidStore(dst.clone()));
    };
    if *n >= cfg.max_y_regs {
        return Err(Reason::Limit);
    }
    let Some(t) = st.y.get(*n as usize).cloned() else {
        return Err(Reason::UninitializedReg(Reg::Y(*n)));
    };
    let ls = match (t, want_catch) {
        (Type::CatchTag(ls), true) | (Type::TryTag(ls), false) => ls,
        (Type::CatchTag(ls), false) => return Err(Reason::Catchtag(ls)),
        (Type::TryTag(ls), true) => return Err(Reason::Trytag(ls)),
        (other, _) => return Err(Reason::BadType(other)),
    };
    match &mut st.ct {
        Ct::Undecided => return Err(Reason::AmbiguousCatchTryState),
        Ct::Stack(stack) => match stack.last() {
            Some(top) if *top == ls => {
                stack.pop();
            }
            _ => {
                return Err(if want_catch {
                    Reason::Catchtag(ls)
                } else {
                    Reason::Trytag(ls)
                });
            }
        },
    }
    break_links(st, Reg::Y(*n));
    st.y[*n as usize] = Type::Initialized;
    Ok(())
}

fn is_float_op(op: &str) -> bool {
    matches!(op, "fadd" | "fsub" | "fmul" | "fdiv" | "fnegate")
}

fn is_pure_bif(op: &str, arity: usize) -> bool {
    match (op, arity) {
        (
            "is_atom" | "is_boolean" | "is_binary" | "is_bitstring" | "is_float"
            | "is_function" | "is_integer" | "is_list" | "is_map" | "is_number" | "is_pid"
            | "is_port" | "is_reference" | "is_tuple",
            1,
        ) => true,
        ("==" | "/=" | "=<" | "<" | ">" | ">=" | "=:=" | "=/=", 2) => true,
        ("self" | "node", 0) => true,
        _ => false,
    }
}

fn type_test_implication(op: &str) -> Option<TermType> {
    Some(match op {
        "is_map" => TermType::Map,
        "is_tuple" => TermType::Tuple(TupleArity::AtLeast(0)),
        "is_binary" | "is_bitstring" => TermType::Binary,
        "is_atom" => TermType::Atom(None),
        "is_integer" => TermType::Integer(None),
        "is_float" => TermType::Float(None),
        "is_number" => TermType::Number,
        "is_boolean" => TermType::Bool,
        _ => return None,
    })
}

/// Tier 3: the floating-point error state machine.
fn valfun_3(vst: &mut Vst<'_>, st: &mut St, instr: &Instr) -> Result<Option<Flow>, Reason> {
    let cfg = vst.cfg;
    match instr {
        Instr::Fclearerror => {
            if st.fls == FloatState::Cleared {
                return Err(Reason::BadFloatingPointState(FloatState::Cleared));
            }
            st.fls = FloatState::Cleared;
            Ok(Some(Flow::Continue))
        }
        Instr::Fcheckerror { fail } => {
            if st.fls != FloatState::Cleared {
                return Err(Reason::BadFloatingPointState(st.fls));
            }
            if *fail != Label::FAIL {
                vst.branch(*fail, st)?;
            }
            st.fls = FloatState::Checked;
            Ok(Some(Flow::Continue))
        }
        Instr::Bif { op, args, dst, .. } if is_float_op(op) => {
            if st.fls != FloatState::Cleared {
                return Err(Reason::BadFloatingPointState(st.fls));
            }
            for a in args {
                let Operand::Fr(n) = a else {
                    return Err(Reason::BadSource(a.clone()));
                };
                if *n >= cfg.max_fr_regs {
                    return Err(Reason::Limit);
                }
                if !st.f.get(*n) {
                    return Err(Reason::UninitializedReg(Reg::Fr(*n)));
                }
            }
            let Operand::Fr(d) = dst else {
                return Err(Reason::InvalidStore(dst.clone()));
            };
            if *d >= cfg.max_fr_regs {
                return Err(Reason::Limit);
            }
            st.f.set(*d);
            Ok(Some(Flow::Continue))
        }
        _ => Ok(None),
    }
}

/// Tier 4: everything else.
fn valfun_4(
    vst: &mut Vst<'_>,
    st: &mut St,
    instr: &Instr,
    ext: &dyn ExtOps,
) -> Result<Flow, Reason> {
    let cfg = vst.cfg;
    let flow = match instr {
        Instr::Call { arity, .. } => {
            do_call(cfg, st, *arity)?;
            Flow::Continue
        }
        Instr::CallExt { arity, func } => {
            do_call(cfg, st, *arity)?;
            if is_exit_func(func) {
                Flow::Kill
            } else {
                Flow::Continue
            }
        }
        Instr::CallFun { arity } => {
            read_term(cfg, st, &Operand::X(*arity))?;
            do_call(cfg, st, *arity + 1)?;
            Flow::Continue
        }
        Instr::Apply { arity } => {
            do_call(cfg, st, *arity + 2)?;
            Flow::Continue
        }
        Instr::CallLast {
            arity,
            lbl,
            dealloc,
        } => {
            do_tail_call(vst, st, *arity, Some(*lbl), Some(*dealloc))?;
            Flow::Kill
        }
        Instr::CallOnly { arity, lbl } => {
            do_tail_call(vst, st, *arity, Some(*lbl), None)?;
            Flow::Kill
        }
        Instr::CallExtLast { arity, dealloc, .. } => {
            do_tail_call(vst, st, *arity, None, Some(*dealloc))?;
            Flow::Kill
        }
        Instr::CallExtOnly { arity, .. } => {
            do_tail_call(vst, st, *arity, None, None)?;
            Flow::Kill
        }
        Instr::ApplyLast { arity, dealloc } => {
            do_tail_call(vst, st, *arity + 2, None, Some(*dealloc))?;
            Flow::Kill
        }
        Instr::Send => {
            do_call(cfg, st, 2)?;
            Flow::Continue
        }
        Instr::Return => match st.numy {
            Frame::None => Flow::Kill,
            other => return Err(Reason::StackFrame(other)),
        },
        Instr::LoopRec { fail, dst } => {
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::fragile(TermType::Any))?;
            Flow::Continue
        }
        Instr::LoopRecEnd { lbl } => {
            vst.branch(*lbl, st)?;
            Flow::Kill
        }
        Instr::Wait { lbl } => {
            vst.branch(*lbl, st)?;
            Flow::Kill
        }
        Instr::WaitTimeout { lbl, src } => {
            read_term(cfg, st, src)?;
            kill_heap(st);
            vst.branch(*lbl, st)?;
            Flow::Continue
        }
        Instr::Timeout => {
            prune_x(st, 0);
            Flow::Continue
        }
        Instr::RemoveMessage => {
            // The removal event: message terms are rooted from here on.
            for slot in st.x.iter_mut().flatten() {
                if let Type::Term { fragile, .. } = slot {
                    *fragile = false;
                }
            }
            Flow::Continue
        }
        Instr::SetTupleElement { src, tuple, index } => {
            if !st.setelem {
                return Err(Reason::IllegalContextForSetTupleElement);
            }
            read_term(cfg, st, src)?;
            let (ty, _) = read_term(cfg, st, tuple)?;
            let want = TermType::Tuple(TupleArity::AtLeast(index + 1));
            if meet(&ty, &want).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            refine_operand(st, tuple, &want)?;
            Flow::Continue
        }
        Instr::SelectVal { src, fail, list } => {
            read_term(cfg, st, src)?;
            if list.is_empty() {
                return Err(Reason::BadSelectList);
            }
            let mut kind = None;
            for (v, _) in list {
                let k = match v {
                    Operand::Atom(_) => 0_u8,
                    Operand::Integer(_) => 1,
                    Operand::Float(_) => 2,
                    _ => return Err(Reason::BadSelectList),
                };
                match kind {
                    None => kind = Some(k),
                    Some(k0) if k0 == k => {}
                    Some(_) => return Err(Reason::BadSelectList),
                }
            }
            for (v, l) in list {
                let sel = match v {
                    Operand::Atom(a) => TermType::Atom(Some(a.clone())),
                    Operand::Integer(i) => TermType::Integer(Some(*i)),
                    Operand::Float(x) => TermType::Float(Some(*x)),
                    _ => continue,
                };
                let mut fork = st.clone();
                let mut alive = true;
                if let Some(r) = as_reg(src) {
                    alive = refine_to(&mut fork, r, &sel);
                    if alive {
                        refine_by_def(&mut fork, r, &sel);
                    }
                }
                // An impossible edge still records a (conservative) state
                // so its label does not read as undefined.
                let branch_st = if alive { fork } else { st.clone() };
                vst.branch(*l, &branch_st)?;
            }
            vst.branch(*fail, st)?;
            Flow::Kill
        }
        Instr::SelectTupleArity { src, fail, list } => {
            let (ty, _) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Tuple(TupleArity::AtLeast(0))).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            if list.is_empty() {
                return Err(Reason::BadTupleArityList);
            }
            let mut seen: BTreeSet<u32> = BTreeSet::new();
            for (a, _) in list {
                if !seen.insert(*a) {
                    return Err(Reason::BadTupleArityList);
                }
            }
            for (a, l) in list {
                let sel = TermType::Tuple(TupleArity::Exact(*a));
                let mut fork = st.clone();
                let mut alive = true;
                if let Some(r) = as_reg(src) {
                    alive = refine_to(&mut fork, r, &sel);
                }
                let branch_st = if alive { fork } else { st.clone() };
                vst.branch(*l, &branch_st)?;
            }
            let mut fallback = st.clone();
            if let Some(r) = as_reg(src) {
                refine_to(&mut fallback, r, &TermType::Tuple(TupleArity::AtLeast(0)));
            }
            vst.branch(*fail, &fallback)?;
            Flow::Kill
        }
        Instr::Test { op, fail, args } => return do_test(vst, st, op, *fail, args),
        Instr::BsStartMatch2 {
            fail,
            live,
            src,
            slots,
            dst,
        } => {
            verify_live(cfg, st, *live)?;
            verify_y_init(st)?;
            if src == dst {
                match read_any(cfg, st, src)? {
                    Type::MatchContext(ctx) => {
                        // The context must not be observable on the
                        // failure branch.
                        let mut erased = st.clone();
                        set_reg(cfg, &mut erased, dst, Type::any())?;
                        prune_x(&mut erased, *live);
                        vst.branch(*fail, &erased)?;
                        prune_x(st, *live);
                        kill_heap(st);
                        set_reg(cfg, st, dst, Type::MatchContext(ctx))?;
                    }
                    _ => {
                        read_term(cfg, st, src)?;
                        prune_x(st, *live);
                        vst.branch(*fail, st)?;
                        kill_heap(st);
                        let id = vst.ids.fresh();
                        set_reg(
                            cfg,
                            st,
                            dst,
                            Type::MatchContext(MatchCtx {
                                id,
                                slots: *slots,
                                valid: 0,
                            }),
                        )?;
                    }
                }
            } else {
                read_term(cfg, st, src)?;
                prune_x(st, *live);
                vst.branch(*fail, st)?;
                kill_heap(st);
                let id = vst.ids.fresh();
                set_reg(
                    cfg,
                    st,
                    dst,
                    Type::MatchContext(MatchCtx {
                        id,
                        slots: *slots,
                        valid: 0,
                    }),
                )?;
            }
            Flow::Continue
        }
        Instr::BsMatchString { fail, ctx, .. } => {
            read_ctx(cfg, st, ctx)?;
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsTestTail2 { fail, ctx, .. } | Instr::BsTestUnit { fail, ctx, .. } => {
            read_ctx(cfg, st, ctx)?;
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsSkipBits2 {
            fail, ctx, size, ..
        } => {
            read_ctx(cfg, st, ctx)?;
            check_size(cfg, st, size, false)?;
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsSkipUtf {
            fail, ctx, live, ..
        } => {
            read_ctx(cfg, st, ctx)?;
            verify_live(cfg, st, *live)?;
            prune_x(st, *live);
            kill_heap(st);
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsGetInteger2 {
            fail,
            ctx,
            live,
            size,
            dst,
            ..
        } => {
            do_bs_get(vst, st, *fail, ctx, *live, size, false, dst, TermType::Integer(None))?;
            Flow::Continue
        }
        Instr::BsGetFloat2 {
            fail,
            ctx,
            live,
            size,
            dst,
            ..
        } => {
            do_bs_get(vst, st, *fail, ctx, *live, size, false, dst, TermType::Float(None))?;
            Flow::Continue
        }
        Instr::BsGetBinary2 {
            fail,
            ctx,
            live,
            size,
            dst,
            ..
        } => {
            do_bs_get(vst, st, *fail, ctx, *live, size, true, dst, TermType::Binary)?;
            Flow::Continue
        }
        Instr::BsGetUtf {
            fail,
            ctx,
            live,
            dst,
            ..
        } => {
            read_ctx(cfg, st, ctx)?;
            verify_live(cfg, st, *live)?;
            prune_x(st, *live);
            kill_heap(st);
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Integer(None)))?;
            Flow::Continue
        }
        Instr::BsSave2 { ctx, slot } => {
            let mut c = read_ctx(cfg, st, ctx)?;
            if *slot >= c.slots || *slot >= 64 {
                return Err(Reason::IllegalSave(*slot));
            }
            c.valid |= 1 << slot;
            write_ctx(st, ctx, c);
            Flow::Continue
        }
        Instr::BsRestore2 { ctx, slot } => {
            let c = read_ctx(cfg, st, ctx)?;
            if *slot >= c.slots || *slot >= 64 || c.valid & (1 << slot) == 0 {
                return Err(Reason::IllegalRestore(*slot));
            }
            Flow::Continue
        }
        Instr::BsInit2 {
            fail,
            size,
            live,
            dst,
            ..
        }
        | Instr::BsInitBits {
            fail,
            size,
            live,
            dst,
            ..
        } => {
            verify_live(cfg, st, *live)?;
            verify_y_init(st)?;
            check_size(cfg, st, size, false)?;
            prune_x(st, *live);
            kill_heap(st);
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Binary))?;
            Flow::Continue
        }
        Instr::BsAppend {
            fail,
            size,
            live,
            src,
            dst,
            ..
        } => {
            verify_live(cfg, st, *live)?;
            verify_y_init(st)?;
            check_size(cfg, st, size, false)?;
            let (ty, _) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Binary).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            refine_operand(st, src, &TermType::Binary)?;
            prune_x(st, *live);
            kill_heap(st);
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Binary))?;
            Flow::Continue
        }
        Instr::BsPrivateAppend {
            fail,
            size,
            src,
            dst,
            ..
        } => {
            check_size(cfg, st, size, false)?;
            let (ty, _) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Binary).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            refine_operand(st, src, &TermType::Binary)?;
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Binary))?;
            Flow::Continue
        }
        Instr::BsPutInteger {
            fail, size, src, ..
        }
        | Instr::BsPutFloat {
            fail, size, src, ..
        } => {
            check_size(cfg, st, size, false)?;
            read_term(cfg, st, src)?;
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsPutBinary {
            fail, size, src, ..
        } => {
            check_size(cfg, st, size, true)?;
            read_term(cfg, st, src)?;
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsPutUtf { fail, src, .. } => {
            read_term(cfg, st, src)?;
            vst.branch(*fail, st)?;
            Flow::Continue
        }
        Instr::BsPutString { .. } => Flow::Continue,
        Instr::BsAdd {
            fail, a, b, dst, ..
        } => {
            check_size(cfg, st, a, false)?;
            check_size(cfg, st, b, false)?;
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Integer(None)))?;
            Flow::Continue
        }
        Instr::BsUtfSize { fail, src, dst, .. } => {
            read_term(cfg, st, src)?;
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Integer(None)))?;
            Flow::Continue
        }
        Instr::PutMapAssoc {
            fail,
            src,
            dst,
            live,
            pairs,
        }
        | Instr::PutMapExact {
            fail,
            src,
            dst,
            live,
            pairs,
        } => {
            let (ty, _) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Map).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            if pairs.is_empty() {
                return Err(Reason::EmptyFieldList);
            }
            if pairs.len() % 2 != 0 {
                return Err(Reason::IllegalInstruction);
            }
            check_unique_keys(pairs.iter().step_by(2))?;
            for p in pairs {
                read_term(cfg, st, p)?;
            }
            verify_live(cfg, st, *live)?;
            verify_y_init(st)?;
            refine_operand(st, src, &TermType::Map)?;
            prune_x(st, *live);
            kill_heap(st);
            vst.branch(*fail, st)?;
            set_reg(cfg, st, dst, Type::term(TermType::Map))?;
            Flow::Continue
        }
        Instr::GetMapElements { fail, src, list } => {
            let (ty, _) = read_term(cfg, st, src)?;
            if meet(&ty, &TermType::Map).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            if list.is_empty() {
                return Err(Reason::EmptyFieldList);
            }
            if list.len() % 2 != 0 {
                return Err(Reason::IllegalInstruction);
            }
            check_unique_keys(list.iter().step_by(2))?;
            for k in list.iter().step_by(2) {
                read_term(cfg, st, k)?;
            }
            refine_operand(st, src, &TermType::Map)?;
            vst.branch(*fail, st)?;
            for d in list.iter().skip(1).step_by(2) {
                set_reg(cfg, st, d, Type::any())?;
            }
            Flow::Continue
        }
        Instr::Bif {
            op,
            fail,
            args,
            dst,
        } => {
            let mut tys = Vec::with_capacity(args.len());
            for a in args {
                tys.push(read_term(cfg, st, a)?.0);
            }
            if *fail != Label::FAIL {
                vst.branch(*fail, st)?;
            }
            if !bif_arg_refine(st, op, args, &tys) {
                return Ok(Flow::Kill);
            }
            set_reg(cfg, st, dst, Type::term(bif_type(op, args.len())))?;
            record_bif_def(st, op, args, dst);
            Flow::Continue
        }
        Instr::GcBif {
            op,
            fail,
            live,
            args,
            dst,
        } => {
            verify_live(cfg, st, *live)?;
            verify_y_init(st)?;
            let mut tys = Vec::with_capacity(args.len());
            for a in args {
                tys.push(read_term(cfg, st, a)?.0);
            }
            kill_heap(st);
            if *fail != Label::FAIL {
                vst.branch(*fail, st)?;
            }
            prune_x(st, *live);
            if !bif_arg_refine(st, op, args, &tys) {
                return Ok(Flow::Kill);
            }
            set_reg(cfg, st, dst, Type::term(bif_type(op, args.len())))?;
            record_bif_def(st, op, args, dst);
            Flow::Continue
        }
        Instr::Unknown { op, args } => match ext.classify(op, args) {
            Some(ExtOpKind::Nop) => Flow::Continue,
            Some(ExtOpKind::KillsState) => Flow::Kill,
            None => return Err(Reason::UnknownInstruction),
        },
        _ => return Err(Reason::UnknownInstruction),
    };
    Ok(flow)
}

/// A call that returns: arguments live, frame GC-safe, result in `x0`.
fn do_call(cfg: &VerifyConfig, st: &mut St, live: u32) -> Result<(), Reason> {
    verify_live(cfg, st, live)?;
    verify_y_init(st)?;
    kill_heap(st);
    prune_x(st, 0);
    set_reg(cfg, st, &Operand::X(0), Type::any())
}

fn do_tail_call(
    vst: &mut Vst<'_>,
    st: &mut St,
    live: u32,
    target: Option<Label>,
    dealloc: Option<u32>,
) -> Result<(), Reason> {
    verify_live(vst.cfg, st, live)?;
    match dealloc {
        Some(d) => match st.numy {
            Frame::Size(s) if s == d => {}
            other => return Err(Reason::StackFrame(other)),
        },
        None => {
            if st.numy != Frame::None {
                return Err(Reason::Allocated(st.numy));
            }
        }
    }
    verify_no_ct(st)?;
    verify_y_init(st)?;
    check_tail_ctx(vst.ft, st, live, target)
}

/// The tail-call match-context discipline: at most one live context, and
/// the callee must be proven to accept it where it sits.
fn check_tail_ctx(
    ft: &BTreeMap<Label, BsmEntry>,
    st: &St,
    nargs: u32,
    target: Option<Label>,
) -> Result<(), Reason> {
    let mut ctxs: Vec<(u32, MatchCtx)> = Vec::new();
    for n in 0..nargs.min(st.x.len() as u32) {
        if let Some(Some(Type::MatchContext(c))) = st.x.get(n as usize) {
            ctxs.push((n, c.clone()));
        }
    }
    let Some((slot, ctx)) = ctxs.first() else {
        return Ok(());
    };
    if ctxs.len() > 1 {
        return Err(Reason::MultipleMatchContexts);
    }
    if st
        .y
        .iter()
        .any(|t| matches!(t, Type::MatchContext(c) if c.id == ctx.id))
    {
        return Err(Reason::MultipleMatchContexts);
    }
    match target {
        None => Err(Reason::NoBsStartMatch2(Label::FAIL)),
        Some(lbl) => match ft.get(&lbl) {
            None => Err(Reason::NoBsStartMatch2(lbl)),
            Some(e) if e.src == Operand::X(*slot) && e.dst == e.src && e.slots >= ctx.slots => {
                Ok(())
            }
            Some(_) => Err(Reason::UnsuitableBsStartMatch2(lbl)),
        },
    }
}

fn is_exit_func(f: &ExtFunc) -> bool {
    f.module == "erlang"
        && matches!(
            (f.name.as_str(), f.arity),
            ("error", 1 | 2) | ("exit", 1) | ("throw", 1) | ("raise", 3) | ("nif_error", 1 | 2)
        )
}

fn read_ctx(cfg: &VerifyConfig, st: &St, op: &Operand) -> Result<MatchCtx, Reason> {
    match op {
        Operand::X(_) | Operand::Y(_) => match read_reg(cfg, st, op)? {
            Type::MatchContext(c) => Ok(c.clone()),
            Type::Uninitialized => Err(Reason::UninitializedReg(reg_or_x0(op))),
            _ => Err(Reason::NoBsmContext(op.clone())),
        },
        _ => Err(Reason::NoBsmContext(op.clone())),
    }
}

/// Updates a context in place, preserving its identity.
fn write_ctx(st: &mut St, op: &Operand, ctx: MatchCtx) {
    let slot = match op {
        Operand::X(n) => st.x.get_mut(*n as usize).and_then(|s| s.as_mut()),
        Operand::Y(n) => st.y.get_mut(*n as usize),
        _ => None,
    };
    if let Some(t) = slot {
        *t = Type::MatchContext(ctx);
    }
}

/// A bit-field size operand: an integer term, or `{atom,all}` where the
/// whole remaining binary is meant.
fn check_size(
    cfg: &VerifyConfig,
    st: &mut St,
    size: &Operand,
    all_ok: bool,
) -> Result<(), Reason> {
    if all_ok && matches!(size, Operand::Atom(a) if a == "all") {
        return Ok(());
    }
    let (ty, _) = read_term(cfg, st, size)?;
    if meet(&ty, &TermType::Integer(None)).is_none() {
        return Err(Reason::BadType(Type::term(ty)));
    }
    refine_operand(st, size, &TermType::Integer(None))
}

fn check_unique_keys<'a>(keys: impl Iterator<Item = &'a Operand>) -> Result<(), Reason> {
    let keys: Vec<&Operand> = keys.collect();
    for (i, k) in keys.iter().enumerate() {
        if keys[..i].contains(k) {
            return Err(Reason::KeysNotUnique);
        }
    }
    Ok(())
}

fn do_test(
    vst: &mut Vst<'_>,
    st: &mut St,
    op: &str,
    fail: Label,
    args: &[Operand],
) -> Result<Flow, Reason> {
    let cfg = vst.cfg;
    match (op, args) {
        ("is_integer", [s]) => type_test(vst, st, fail, s, Some(TermType::Integer(None))),
        ("is_float", [s]) => type_test(vst, st, fail, s, Some(TermType::Float(None))),
        ("is_number", [s]) => type_test(vst, st, fail, s, Some(TermType::Number)),
        ("is_atom", [s]) => type_test(vst, st, fail, s, Some(TermType::Atom(None))),
        ("is_boolean", [s]) => type_test(vst, st, fail, s, Some(TermType::Bool)),
        ("is_binary" | "is_bitstr" | "is_bitstring", [s]) => {
            type_test(vst, st, fail, s, Some(TermType::Binary))
        }
        ("is_nil", [s]) => type_test(vst, st, fail, s, Some(TermType::Nil)),
        ("is_nonempty_list", [s]) => type_test(vst, st, fail, s, Some(TermType::Cons)),
        ("is_map", [s]) => type_test(vst, st, fail, s, Some(TermType::Map)),
        ("is_tuple", [s]) => {
            type_test(vst, st, fail, s, Some(TermType::Tuple(TupleArity::AtLeast(0))))
        }
        ("is_list" | "is_pid" | "is_port" | "is_reference" | "is_function", [s]) => {
            type_test(vst, st, fail, s, None)
        }
        ("is_function2", [s, a]) => {
            read_term(cfg, st, s)?;
            read_term(cfg, st, a)?;
            vst.branch(fail, st)?;
            Ok(Flow::Continue)
        }
        ("test_arity", [s, Operand::Integer(n)]) => {
            if *n < 0 {
                return Err(Reason::IllegalInstruction);
            }
            let (ty, _) = read_term(cfg, st, s)?;
            if meet(&ty, &TermType::Tuple(TupleArity::AtLeast(0))).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            type_test(
                vst,
                st,
                fail,
                s,
                Some(TermType::Tuple(TupleArity::Exact(*n as u32))),
            )
        }
        ("is_tagged_tuple", [s, Operand::Integer(n), Operand::Atom(_)]) if *n >= 0 => type_test(
            vst,
            st,
            fail,
            s,
            Some(TermType::Tuple(TupleArity::Exact(*n as u32))),
        ),
        ("is_eq_exact", [a, b]) => {
            let (ta, _) = read_term(cfg, st, a)?;
            let (tb, _) = read_term(cfg, st, b)?;
            vst.branch(fail, st)?;
            if meet(&ta, &tb).is_none() {
                return Ok(Flow::Kill);
            }
            if let Some(ra) = as_reg(a) {
                if !refine_to(st, ra, &tb) {
                    return Ok(Flow::Kill);
                }
                refine_by_def(st, ra, &tb);
            }
            if let Some(rb) = as_reg(b) {
                if !refine_to(st, rb, &ta) {
                    return Ok(Flow::Kill);
                }
                refine_by_def(st, rb, &ta);
            }
            Ok(Flow::Continue)
        }
        ("is_ne_exact" | "is_eq" | "is_ne" | "is_lt" | "is_ge", [a, b]) => {
            read_term(cfg, st, a)?;
            read_term(cfg, st, b)?;
            vst.branch(fail, st)?;
            Ok(Flow::Continue)
        }
        ("has_map_fields", [s, Operand::List(keys)]) => {
            let (ty, _) = read_term(cfg, st, s)?;
            if meet(&ty, &TermType::Map).is_none() {
                return Err(Reason::BadType(Type::term(ty)));
            }
            if keys.is_empty() {
                return Err(Reason::EmptyFieldList);
            }
            check_unique_keys(keys.iter())?;
            for k in keys {
                read_term(cfg, st, k)?;
            }
            vst.branch(fail, st)?;
            refine_operand(st, s, &TermType::Map)?;
            Ok(Flow::Continue)
        }
        _ => {
            // Unrecognized tests keep their operands honest and branch.
            for a in args {
                match a {
                    Operand::List(xs) => {
                        for x in xs {
                            read_term(cfg, st, x)?;
                        }
                    }
                    other => {
                        read_term(cfg, st, other)?;
                    }
                }
            }
            vst.branch(fail, st)?;
            Ok(Flow::Continue)
        }
    }
}

fn type_test(
    vst: &mut Vst<'_>,
    st: &mut St,
    fail: Label,
    src: &Operand,
    refine: Option<TermType>,
) -> Result<Flow, Reason> {
    read_term(vst.cfg, st, src)?;
    vst.branch(fail, st)?;
    if let (Some(tt), Some(r)) = (refine, as_reg(src))
        && !refine_to(st, r, &tt)
    {
        // The test can never succeed here; the fall-through is dead.
        return Ok(Flow::Kill);
    }
    Ok(Flow::Continue)
}

/// Applies the §4.6-style defining-instruction refinements: knowledge
/// about a test result transfers to the register the test inspected.
fn refine_by_def(st: &mut St, r: Reg, sel: &TermType) {
    let Some(def) = st.defs.get(&r).cloned() else {
        return;
    };
    match def {
        Def::TupleSize(treg) => {
            if let TermType::Integer(Some(n)) = sel
                && *n >= 0
            {
                refine_to(st, treg, &TermType::Tuple(TupleArity::Exact(*n as u32)));
            }
        }
        Def::TypeTest(mreg, tt) => {
            if matches!(sel, TermType::Atom(Some(a)) if a == "true") {
                refine_to(st, mreg, &tt);
            }
        }
    }
}

fn record_bif_def(st: &mut St, op: &str, args: &[Operand], dst: &Operand) {
    let (Some(dreg), Some(arg)) = (as_reg(dst), args.first()) else {
        return;
    };
    let Some(areg) = as_reg(arg) else {
        return;
    };
    if op == "tuple_size" && args.len() == 1 {
        st.defs.insert(dreg, Def::TupleSize(areg));
    } else if let Some(tt) = type_test_implication(op) {
        st.defs.insert(dreg, Def::TypeTest(areg, tt));
    }
}

/// Narrows bif arguments on the fall-through path. Returns `false` when an
/// argument can never satisfy the bif, i.e. the fall-through is dead.
fn bif_arg_refine(st: &mut St, op: &str, args: &[Operand], tys: &[TermType]) -> bool {
    let wants: Vec<(usize, TermType)> = match (op, args.len()) {
        ("+" | "-" | "*" | "/" | "abs" | "float", _) => {
            (0..args.len()).map(|i| (i, TermType::Number)).collect()
        }
        ("div" | "rem" | "band" | "bor" | "bxor" | "bsl" | "bsr" | "bnot", _) => (0..args.len())
            .map(|i| (i, TermType::Integer(None)))
            .collect(),
        ("hd" | "tl", 1) => vec![(0, TermType::Cons)],
        ("map_size", 1) => vec![(0, TermType::Map)],
        ("map_get", 2) => vec![(1, TermType::Map)],
        ("byte_size" | "bit_size", 1) => vec![(0, TermType::Binary)],
        ("tuple_size", 1) => vec![(0, TermType::Tuple(TupleArity::AtLeast(0)))],
        ("element", 2) => {
            let at_least = match args.first() {
                Some(Operand::Integer(n)) if *n >= 1 => *n as u32,
                _ => 0,
            };
            vec![(1, TermType::Tuple(TupleArity::AtLeast(at_least)))]
        }
        ("setelement", 3) => vec![(1, TermType::Tuple(TupleArity::AtLeast(0)))],
        _ => Vec::new(),
    };
    for (i, want) in wants {
        match as_reg(&args[i]) {
            Some(r) => {
                if !refine_to(st, r, &want) {
                    return false;
                }
            }
            None => {
                if tys.get(i).is_none_or(|t| meet(t, &want).is_none()) {
                    return false;
                }
            }
        }
    }
    true
}

fn bif_type(op: &str, arity: usize) -> TermType {
    match (op, arity) {
        (
            "tuple_size" | "length" | "size" | "byte_size" | "bit_size" | "map_size" | "trunc"
            | "round",
            1,
        ) => TermType::Integer(None),
        ("div" | "rem" | "band" | "bor" | "bxor" | "bsl" | "bsr", 2) | ("bnot", 1) => {
            TermType::Integer(None)
        }
        ("+" | "-" | "*", _) | ("abs", 1) => TermType::Number,
        ("/", 2) | ("float", 1) => TermType::Float(None),
        ("==" | "/=" | "=<" | "<" | ">" | ">=" | "=:=" | "=/=", 2) => TermType::Bool,
        ("is_map_key", 2) | ("not", 1) | ("and" | "or" | "xor", 2) => TermType::Bool,
        ("node", 0 | 1) => TermType::Atom(None),
        ("setelement", 3) => TermType::Tuple(TupleArity::AtLeast(0)),
        _ if op.starts_with("is_") => TermType::Bool,
        _ => TermType::Any,
    }
}

#[allow(clippy::too_many_arguments)]
fn do_bs_get(
    vst: &mut Vst<'_>,
    st: &mut St,
    fail: Label,
    ctx: &Operand,
    live: u32,
    size: &Operand,
    size_all_ok: bool,
    dst: &Operand,
    out: TermType,
) -> Result<(), Reason> {
    let cfg = vst.cfg;
    read_ctx(cfg, st, ctx)?;
    verify_live(cfg, st, live)?;
    check_size(cfg, st, size, size_all_ok)?;
    prune_x(st, live);
    kill_heap(st);
    vst.branch(fail, st)?;
    set_reg(cfg, st, dst, Type::term(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Utf;
    use crate::program::Lit;

    fn func(name: &str, arity: u32, entry: u32, body: Vec<Instr>) -> Function {
        let mut code = vec![
            Instr::Label {
                lbl: Label(entry - 1),
            },
            Instr::FuncInfo {
                module: "t".into(),
                name: name.into(),
                arity,
            },
            Instr::Label { lbl: Label(entry) },
        ];
        code.extend(body);
        Function {
            name: name.into(),
            arity,
            entry: Label(entry),
            code,
        }
    }

    fn wrap(arity: u32, body: Vec<Instr>) -> Function {
        func("f", arity, 2, body)
    }

    fn modl(functions: Vec<Function>) -> Module {
        Module {
            name: "t".into(),
            exports: Vec::new(),
            attributes: Vec::new(),
            functions,
            label_count: 100,
        }
    }

    fn check(m: &Module) -> Result<(), ModuleError> {
        verify_module(m, &VerifyConfig::default())
    }

    fn fail_at(m: &Module) -> (usize, Reason) {
        let err = check(m).unwrap_err();
        match &err.diagnostics[0].kind {
            DiagnosticKind::Instr { offset, reason, .. } => (*offset, reason.clone()),
            DiagnosticKind::UndefLabels { labels } => {
                panic!("unexpected undef_labels: {labels:?}")
            }
        }
    }

    fn ext(module: &str, name: &str, arity: u32) -> ExtFunc {
        ExtFunc {
            module: module.into(),
            name: name.into(),
            arity,
        }
    }

    #[test]
    fn accepts_bare_return() {
        let m = modl(vec![wrap(0, vec![Instr::Return])]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_deallocate_of_half_initialized_frame() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Allocate { stack: 2, live: 1 },
                Instr::Move {
                    src: Operand::X(0),
                    dst: Operand::Y(0),
                },
                Instr::Deallocate { n: 2 },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (5, Reason::StackFrame(Frame::Size(2))));
    }

    #[test]
    fn accepts_deallocate_of_full_frame() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Allocate { stack: 2, live: 1 },
                Instr::Move {
                    src: Operand::X(0),
                    dst: Operand::Y(0),
                },
                Instr::Move {
                    src: Operand::X(0),
                    dst: Operand::Y(1),
                },
                Instr::Deallocate { n: 2 },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_return_during_tuple_build() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::PutTuple {
                    arity: 2,
                    dst: Operand::X(0),
                },
                Instr::Put {
                    src: Operand::Integer(1),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (5, Reason::NotBuildingATuple));
    }

    #[test]
    fn rejects_label_during_tuple_build() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::PutTuple {
                    arity: 1,
                    dst: Operand::X(0),
                },
                Instr::Label { lbl: Label(5) },
                Instr::Put {
                    src: Operand::Nil,
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::NotBuildingATuple));
    }

    #[test]
    fn accepts_completed_tuple_build() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::TestHeap {
                    need: Alloc::Words(3),
                    live: 0,
                },
                Instr::PutTuple {
                    arity: 2,
                    dst: Operand::X(0),
                },
                Instr::Put {
                    src: Operand::Integer(1),
                },
                Instr::Put {
                    src: Operand::Atom("a".into()),
                },
                Instr::GetTupleElement {
                    src: Operand::X(0),
                    index: 1,
                    dst: Operand::X(1),
                },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_inner_catch_below_outer_catch() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::AllocateZero { stack: 2, live: 0 },
                Instr::Catch {
                    dst: Operand::Y(1),
                    fail: Label(9),
                },
                Instr::Catch {
                    dst: Operand::Y(0),
                    fail: Label(10),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(
            fail_at(&m),
            (
                5,
                Reason::BadTryCatchNesting {
                    tag: Reg::Y(0),
                    active: vec![1],
                }
            )
        );
    }

    #[test]
    fn rejects_float_arith_without_fclearerror() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::Bif {
                    op: "fadd".into(),
                    fail: Label::FAIL,
                    args: vec![Operand::Fr(0), Operand::Fr(1)],
                    dst: Operand::Fr(2),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(
            fail_at(&m),
            (3, Reason::BadFloatingPointState(FloatState::Undefined))
        );
    }

    #[test]
    fn rejects_fragile_message_stored_in_y() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::LoopRec {
                    fail: Label(3),
                    dst: Operand::X(0),
                },
                Instr::Move {
                    src: Operand::X(0),
                    dst: Operand::Y(0),
                },
                Instr::Label { lbl: Label(3) },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::FragileMessageReference(Reg::Y(0))));
    }

    #[test]
    fn remove_message_unfreezes_the_message() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::Allocate { stack: 1, live: 0 },
                Instr::LoopRec {
                    fail: Label(3),
                    dst: Operand::X(0),
                },
                Instr::RemoveMessage,
                Instr::Move {
                    src: Operand::X(0),
                    dst: Operand::Y(0),
                },
                Instr::Deallocate { n: 1 },
                Instr::Return,
                Instr::Label { lbl: Label(3) },
                Instr::Init { y: Operand::Y(0) },
                Instr::Deallocate { n: 1 },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn float_block_round_trip() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::TestHeap {
                    need: Alloc::Mixed { words: 0, floats: 1 },
                    live: 1,
                },
                Instr::Fclearerror,
                Instr::Fconv {
                    src: Operand::X(0),
                    dst: Operand::Fr(0),
                },
                Instr::Bif {
                    op: "fadd".into(),
                    fail: Label::FAIL,
                    args: vec![Operand::Fr(0), Operand::Fr(0)],
                    dst: Operand::Fr(1),
                },
                Instr::Fcheckerror { fail: Label::FAIL },
                Instr::Fmove {
                    src: Operand::Fr(1),
                    dst: Operand::X(0),
                },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_general_instruction_inside_float_block() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Fclearerror,
                Instr::Bif {
                    op: "+".into(),
                    fail: Label::FAIL,
                    args: vec![Operand::X(0), Operand::X(0)],
                    dst: Operand::X(1),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::UnsafeInstruction));
    }

    #[test]
    fn rejects_double_fclearerror() {
        let m = modl(vec![wrap(
            0,
            vec![Instr::Fclearerror, Instr::Fclearerror, Instr::Return],
        )]);
        assert_eq!(
            fail_at(&m),
            (4, Reason::BadFloatingPointState(FloatState::Cleared))
        );
    }

    #[test]
    fn rejects_read_of_unwritten_x_register() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::Move {
                    src: Operand::X(0),
                    dst: Operand::X(1),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (3, Reason::UninitializedReg(Reg::X(0))));
    }

    #[test]
    fn catch_round_trip() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::AllocateZero { stack: 1, live: 0 },
                Instr::Catch {
                    dst: Operand::Y(0),
                    fail: Label(9),
                },
                Instr::Move {
                    src: Operand::Atom("ok".into()),
                    dst: Operand::X(0),
                },
                Instr::Label { lbl: Label(9) },
                Instr::CatchEnd {
                    dst: Operand::Y(0),
                },
                Instr::Deallocate { n: 1 },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_try_end_on_catch_tag() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::AllocateZero { stack: 1, live: 0 },
                Instr::Catch {
                    dst: Operand::Y(0),
                    fail: Label(9),
                },
                Instr::TryEnd {
                    dst: Operand::Y(0),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (5, Reason::Catchtag(vec![Label(9)])));
    }

    #[test]
    fn rejects_deallocate_with_live_tag() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::AllocateZero { stack: 1, live: 0 },
                Instr::Catch {
                    dst: Operand::Y(0),
                    fail: Label(9),
                },
                Instr::Deallocate { n: 1 },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (5, Reason::UnfinishedCatchTry));
    }

    #[test]
    fn reports_undefined_labels() {
        let m = modl(vec![wrap(0, vec![Instr::Jump { lbl: Label(99) }])]);
        let err = check(&m).unwrap_err();
        assert_eq!(
            err.diagnostics[0].kind,
            DiagnosticKind::UndefLabels {
                labels: vec![Label(99)],
            }
        );
    }

    #[test]
    fn tuple_size_feeds_select_val_refinement() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Bif {
                    op: "tuple_size".into(),
                    fail: Label::FAIL,
                    args: vec![Operand::X(0)],
                    dst: Operand::X(1),
                },
                Instr::SelectVal {
                    src: Operand::X(1),
                    fail: Label(7),
                    list: vec![(Operand::Integer(2), Label(8))],
                },
                Instr::Label { lbl: Label(7) },
                Instr::Badmatch {
                    src: Operand::X(0),
                },
                Instr::Label { lbl: Label(8) },
                Instr::GetTupleElement {
                    src: Operand::X(0),
                    index: 1,
                    dst: Operand::X(2),
                },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn literal_equality_pins_tuple_arity() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Test {
                    op: "is_eq_exact".into(),
                    fail: Label(7),
                    args: vec![
                        Operand::X(0),
                        Operand::Literal(Lit::Tuple(vec![Lit::Int(1), Lit::Int(2)])),
                    ],
                },
                Instr::GetTupleElement {
                    src: Operand::X(0),
                    index: 1,
                    dst: Operand::X(1),
                },
                Instr::Return,
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_register_over_the_implementation_limit() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::Move {
                    src: Operand::Atom("a".into()),
                    dst: Operand::X(1023),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (3, Reason::Limit));
    }

    fn bs_start(fail: u32, src: Operand, slots: u32, dst: Operand) -> Instr {
        Instr::BsStartMatch2 {
            fail: Label(fail),
            live: 1,
            src,
            slots,
            dst,
        }
    }

    #[test]
    fn save_and_restore_round_trip() {
        let m = modl(vec![wrap(
            1,
            vec![
                bs_start(7, Operand::X(0), 2, Operand::X(0)),
                Instr::BsSave2 {
                    ctx: Operand::X(0),
                    slot: 0,
                },
                Instr::BsRestore2 {
                    ctx: Operand::X(0),
                    slot: 0,
                },
                Instr::Return,
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_save_outside_declared_slots() {
        let m = modl(vec![wrap(
            1,
            vec![
                bs_start(7, Operand::X(0), 2, Operand::X(0)),
                Instr::BsSave2 {
                    ctx: Operand::X(0),
                    slot: 2,
                },
                Instr::Return,
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::IllegalSave(2)));
    }

    #[test]
    fn rejects_restore_of_unsaved_slot() {
        let m = modl(vec![wrap(
            1,
            vec![
                bs_start(7, Operand::X(0), 2, Operand::X(0)),
                Instr::BsRestore2 {
                    ctx: Operand::X(0),
                    slot: 1,
                },
                Instr::Return,
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::IllegalRestore(1)));
    }

    #[test]
    fn tail_call_may_pass_a_context_to_a_matching_entry() {
        let callee = func(
            "g",
            1,
            4,
            vec![
                bs_start(5, Operand::X(0), 0, Operand::X(0)),
                Instr::Return,
                Instr::Label { lbl: Label(5) },
                Instr::Return,
            ],
        );
        let caller = wrap(
            1,
            vec![
                bs_start(7, Operand::X(0), 0, Operand::X(0)),
                Instr::CallOnly {
                    arity: 1,
                    lbl: Label(4),
                },
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        );
        check(&modl(vec![caller, callee])).unwrap();
    }

    #[test]
    fn tail_call_context_needs_a_matching_entry() {
        let callee = func("g", 1, 4, vec![Instr::Return]);
        let caller = wrap(
            1,
            vec![
                bs_start(7, Operand::X(0), 0, Operand::X(0)),
                Instr::CallOnly {
                    arity: 1,
                    lbl: Label(4),
                },
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        );
        let err = check(&modl(vec![caller, callee])).unwrap_err();
        assert_eq!(err.diagnostics.len(), 1);
        match &err.diagnostics[0].kind {
            DiagnosticKind::Instr { offset, reason, .. } => {
                assert_eq!(*offset, 4);
                assert_eq!(*reason, Reason::NoBsStartMatch2(Label(4)));
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[test]
    fn entry_stub_branches_must_not_see_a_frame() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::Allocate { stack: 1, live: 0 },
                Instr::Jump { lbl: Label(1) },
            ],
        )]);
        assert_eq!(fail_at(&m), (1, Reason::Allocated(Frame::Size(1))));
    }

    #[test]
    fn dead_code_is_skipped() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::Return,
                Instr::Move {
                    src: Operand::X(9),
                    dst: Operand::X(8),
                },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_live_count_above_defined_registers() {
        let m = modl(vec![wrap(
            0,
            vec![Instr::Allocate { stack: 0, live: 1 }, Instr::Return],
        )]);
        assert_eq!(fail_at(&m), (3, Reason::NotLive(Reg::X(0))));
    }

    #[test]
    fn rejects_building_past_the_heap_reservation() {
        let m = modl(vec![wrap(
            0,
            vec![
                Instr::TestHeap {
                    need: Alloc::Words(1),
                    live: 0,
                },
                Instr::PutList {
                    head: Operand::Nil,
                    tail: Operand::Nil,
                    dst: Operand::X(0),
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::HeapOverflow { left: 1, need: 2 }));
    }

    #[test]
    fn set_tuple_element_requires_a_preceding_setelement() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::SetTupleElement {
                    src: Operand::Atom("a".into()),
                    tuple: Operand::X(0),
                    index: 0,
                },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (3, Reason::IllegalContextForSetTupleElement));

        let m = modl(vec![wrap(
            3,
            vec![
                Instr::CallExt {
                    arity: 3,
                    func: ext("erlang", "setelement", 3),
                },
                Instr::SetTupleElement {
                    src: Operand::Atom("a".into()),
                    tuple: Operand::X(0),
                    index: 0,
                },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_mixed_select_val_lists() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::SelectVal {
                    src: Operand::X(0),
                    fail: Label(7),
                    list: vec![
                        (Operand::Atom("a".into()), Label(8)),
                        (Operand::Integer(1), Label(8)),
                    ],
                },
                Instr::Label { lbl: Label(7) },
                Instr::Return,
                Instr::Label { lbl: Label(8) },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (3, Reason::BadSelectList));
    }

    #[test]
    fn rejects_a_missing_entry_label() {
        let f = Function {
            name: "f".into(),
            arity: 0,
            entry: Label(5),
            code: vec![
                Instr::Label { lbl: Label(1) },
                Instr::FuncInfo {
                    module: "t".into(),
                    name: "f".into(),
                    arity: 0,
                },
                Instr::Label { lbl: Label(2) },
                Instr::Return,
            ],
        };
        assert_eq!(fail_at(&modl(vec![f])), (1, Reason::NoEntryLabel(Label(5))));
    }

    #[test]
    fn branch_to_label_zero_verifies_the_frame() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Test {
                    op: "is_integer".into(),
                    fail: Label::FAIL,
                    args: vec![Operand::X(0)],
                },
                Instr::Return,
            ],
        )]);
        check(&m).unwrap();

        let m = modl(vec![wrap(
            1,
            vec![
                Instr::Allocate { stack: 1, live: 1 },
                Instr::Test {
                    op: "is_integer".into(),
                    fail: Label::FAIL,
                    args: vec![Operand::X(0)],
                },
                Instr::Init { y: Operand::Y(0) },
                Instr::Deallocate { n: 1 },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (4, Reason::UninitializedReg(Reg::Y(0))));
    }

    #[test]
    fn unknown_opcodes_need_an_extension() {
        let body = vec![
            Instr::Unknown {
                op: "hibernate_hint".into(),
                args: Vec::new(),
            },
            Instr::Return,
        ];
        let m = modl(vec![wrap(0, body)]);
        assert_eq!(fail_at(&m), (3, Reason::UnknownInstruction));

        struct Hints;
        impl ExtOps for Hints {
            fn classify(&self, op: &str, _args: &[Operand]) -> Option<ExtOpKind> {
                (op == "hibernate_hint").then_some(ExtOpKind::Nop)
            }
        }
        verify_module_with(&m, &VerifyConfig::default(), &Hints).unwrap();
    }

    #[test]
    fn utf_skip_needs_a_context() {
        let m = modl(vec![wrap(
            1,
            vec![
                Instr::BsSkipUtf {
                    width: Utf::Utf8,
                    fail: Label(7),
                    ctx: Operand::X(0),
                    live: 1,
                },
                Instr::Label { lbl: Label(7) },
                Instr::Return,
            ],
        )]);
        assert_eq!(fail_at(&m), (3, Reason::NoBsmContext(Operand::X(0))));
    }

    #[test]
    fn get_map_elements_checks_its_field_list() {
        let get = |list: Vec<Operand>| {
            modl(vec![wrap(
                1,
                vec![
                    Instr::Test {
                        op: "is_map".into(),
                        fail: Label(7),
                        args: vec![Operand::X(0)],
                    },
                    Instr::GetMapElements {
                        fail: Label(7),
                        src: Operand::X(0),
                        list,
                    },
                    Instr::Return,
                    Instr::Label { lbl: Label(7) },
                    Instr::Return,
                ],
            )])
        };
        check(&get(vec![Operand::Atom("k".into()), Operand::X(1)])).unwrap();
        assert_eq!(fail_at(&get(Vec::new())), (4, Reason::EmptyFieldList));
        assert_eq!(
            fail_at(&get(vec![
                Operand::Atom("k".into()),
                Operand::X(1),
                Operand::Atom("k".into()),
                Operand::X(2),
            ])),
            (4, Reason::KeysNotUnique)
        );
    }

    #[test]
    fn verification_is_deterministic() {
        let m = modl(vec![
            wrap(
                0,
                vec![
                    Instr::Move {
                        src: Operand::X(0),
                        dst: Operand::X(1),
                    },
                    Instr::Return,
                ],
            ),
            func("g", 0, 4, vec![Instr::Allocate { stack: 1, live: 1 }]),
        ]);
        let a = check(&m).unwrap_err();
        let b = check(&m).unwrap_err();
        assert_eq!(a, b);
        assert_eq!(a.diagnostics.len(), 2);
    }
}
