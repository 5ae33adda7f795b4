//! Shared test doubles: an in-memory target, a small 64-bit architecture,
//! a table-driven symbol file and an unwinder that walks fixed-size frames.
//!
//! Every mock function has a fixed frame size. A frame's return address is
//! stored in the last 8 bytes of its frame and its caller's stack pointer is
//! the first byte past it:
//!
//! ```text
//!   sp            sp + size - 8     sp + size
//!   | locals ...  | return address  | caller's frame ...
//! ```

#![allow(dead_code)]

use cairn_frames::{
    Addr, Arch, FrameBase, FrameBaseRegistry, FrameCache, FrameId, FrameKind, FrameRef,
    FrameResult, Language, PrologueCache, RegNum, RegisterValue, SourceLine, StackDirection,
    Symbols, Target, TargetError, Unwinder, UnwinderRegistry,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

// ── Registers ────────────────────────────────────────────────────────────────

pub const PC: RegNum = 0;
pub const SP: RegNum = 1;
pub const FP: RegNum = 2;
pub const R3: RegNum = 3;
/// Clobbered by every call; optimized out in every outer frame.
pub const R4: RegNum = 4;
pub const NUM_REGS: usize = 5;
pub const REG_SIZE: usize = 8;

pub const INITIAL_SP: Addr = 0x7000;
pub const LIVE_FP: u64 = 0x7f00;
pub const LIVE_R3: u64 = 0x33;
pub const LIVE_R4: u64 = 0x44;

// ── Arch ─────────────────────────────────────────────────────────────────────

pub struct MockArch {
    pub direction: StackDirection,
    /// Provide `unwind_pc` by unwinding the PC register.
    pub unwind_pc: bool,
}

impl Default for MockArch {
    fn default() -> Self {
        Self {
            direction: StackDirection::Down,
            unwind_pc: true,
        }
    }
}

impl Arch for MockArch {
    fn name(&self) -> &str {
        "mock64"
    }

    fn stack_direction(&self) -> StackDirection {
        self.direction
    }

    fn num_registers(&self) -> usize {
        NUM_REGS
    }

    fn register_name(&self, regnum: RegNum) -> Option<&str> {
        ["pc", "sp", "fp", "r3", "r4"].get(regnum).copied()
    }

    fn register_size(&self, _regnum: RegNum) -> usize {
        REG_SIZE
    }

    fn pc_regnum(&self) -> RegNum {
        PC
    }

    fn sp_regnum(&self) -> Option<RegNum> {
        Some(SP)
    }

    fn unwind_pc(&self, frames: &mut FrameCache, next: FrameRef) -> FrameResult<Option<Addr>> {
        if !self.unwind_pc {
            return Ok(None);
        }
        frames.unwind_register_unsigned(next, PC).map(Some)
    }
}

// ── Target ───────────────────────────────────────────────────────────────────

pub struct TargetState {
    pub registers: HashMap<RegNum, u64>,
    pub memory: BTreeMap<Addr, u8>,
    pub has_registers: bool,
    pub has_stack: bool,
    pub has_memory: bool,
    pub has_execution: bool,
    /// Registers whose writes fail.
    pub read_only: HashSet<RegNum>,
}

/// In-memory target. Clones share state, so a test can keep a handle while
/// the frame cache owns another.
#[derive(Clone)]
pub struct MockTarget {
    pub state: Rc<RefCell<TargetState>>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(TargetState {
                registers: HashMap::new(),
                memory: BTreeMap::new(),
                has_registers: true,
                has_stack: true,
                has_memory: true,
                has_execution: true,
                read_only: HashSet::new(),
            })),
        }
    }

    pub fn set_register(&self, regnum: RegNum, value: u64) {
        self.state.borrow_mut().registers.insert(regnum, value);
    }

    pub fn register(&self, regnum: RegNum) -> u64 {
        self.state.borrow().registers[&regnum]
    }

    pub fn write_u64(&self, addr: Addr, value: u64) {
        let mut state = self.state.borrow_mut();
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            state.memory.insert(addr + i as u64, byte);
        }
    }

    pub fn read_u64(&self, addr: Addr) -> u64 {
        let state = self.state.borrow();
        let bytes: Vec<u8> = (0..8).map(|i| state.memory[&(addr + i)]).collect();
        u64::from_le_bytes(bytes.try_into().unwrap())
    }
}

impl Target for MockTarget {
    fn has_registers(&self) -> bool {
        self.state.borrow().has_registers
    }

    fn has_stack(&self) -> bool {
        self.state.borrow().has_stack
    }

    fn has_memory(&self) -> bool {
        self.state.borrow().has_memory
    }

    fn has_execution(&self) -> bool {
        self.state.borrow().has_execution
    }

    fn read_register(&self, regnum: RegNum) -> Result<Vec<u8>, TargetError> {
        self.state
            .borrow()
            .registers
            .get(&regnum)
            .map(|value| value.to_le_bytes().to_vec())
            .ok_or(TargetError::RegisterAccess { regnum })
    }

    fn write_register(&mut self, regnum: RegNum, bytes: &[u8]) -> Result<(), TargetError> {
        if self.state.borrow().read_only.contains(&regnum) {
            return Err(TargetError::RegisterAccess { regnum });
        }
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| TargetError::RegisterAccess { regnum })?;
        self.set_register(regnum, u64::from_le_bytes(bytes));
        Ok(())
    }

    fn read_memory(&self, addr: Addr, buf: &mut [u8]) -> Result<(), TargetError> {
        let state = self.state.borrow();
        for (i, slot) in buf.iter_mut().enumerate() {
            let at = addr + i as u64;
            *slot = *state
                .memory
                .get(&at)
                .ok_or(TargetError::MemoryAccess { addr: at })?;
        }
        Ok(())
    }

    fn write_memory(&mut self, addr: Addr, bytes: &[u8]) -> Result<(), TargetError> {
        let mut state = self.state.borrow_mut();
        for (i, byte) in bytes.iter().enumerate() {
            state.memory.insert(addr + i as u64, *byte);
        }
        Ok(())
    }
}

// ── Symbols ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MockFunction {
    pub name: &'static str,
    pub start: Addr,
    pub end: Addr,
    pub frame_size: u64,
    pub kind: FrameKind,
    pub language: Language,
}

impl MockFunction {
    fn new(name: &'static str, start: Addr, frame_size: u64, language: Language) -> Self {
        Self {
            name,
            start,
            end: start + 0x100,
            frame_size,
            kind: FrameKind::Normal,
            language,
        }
    }
}

pub const F: Addr = 0x1000;
pub const G: Addr = 0x2000;
pub const MAIN: Addr = 0x3000;
pub const SIGTRAMP: Addr = 0x4000;
pub const START: Addr = 0x500;
pub const REC: Addr = 0x8000;

pub struct MockSymbols {
    pub functions: Vec<MockFunction>,
    pub main: Option<Addr>,
}

impl MockSymbols {
    pub fn standard() -> Self {
        let mut sigtramp = MockFunction::new("__sigtramp", SIGTRAMP, 0x30, Language::Unknown);
        sigtramp.kind = FrameKind::SignalTrampoline;
        Self {
            functions: vec![
                MockFunction::new("f", F, 0x10, Language::C),
                MockFunction::new("g", G, 0x20, Language::Cplus),
                MockFunction::new("main", MAIN, 0x40, Language::C),
                MockFunction::new("_start", START, 0x10, Language::Asm),
                MockFunction::new("rec", REC, 0x20, Language::C),
                sigtramp,
            ],
            main: Some(MAIN),
        }
    }

    pub fn lookup(&self, pc: Addr) -> Option<&MockFunction> {
        self.functions
            .iter()
            .find(|func| func.start <= pc && pc < func.end)
    }
}

impl Symbols for MockSymbols {
    fn function_start(&self, pc: Addr) -> Option<Addr> {
        self.lookup(pc).map(|func| func.start)
    }

    fn main_address(&self) -> Option<Addr> {
        self.main
    }

    /// Every function is laid out as 8-byte lines starting at line 1.
    fn find_line(&self, pc: Addr, notcurrent: bool) -> Option<SourceLine> {
        let pc = if notcurrent { pc - 1 } else { pc };
        let func = self.lookup(pc)?;
        let index = (pc - func.start) / 8;
        Some(SourceLine {
            file: format!("{}.c", func.name),
            line: index as u32 + 1,
            pc: func.start + index * 8,
            end: func.start + index * 8 + 8,
        })
    }

    fn language_at(&self, pc: Addr) -> Language {
        self.lookup(pc)
            .map(|func| func.language)
            .unwrap_or(Language::Unknown)
    }
}

// ── Table-driven unwinder ────────────────────────────────────────────────────

/// What the table unwinder learns about one frame.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub function: Option<MockFunction>,
    pub sp: Addr,
    pub pc: Addr,
}

impl Analysis {
    fn return_slot(&self) -> Option<Addr> {
        self.function
            .as_ref()
            .map(|func| self.sp + func.frame_size - 8)
    }
}

fn analyze(
    symbols: &MockSymbols,
    analyses: &Cell<usize>,
    frames: &mut FrameCache,
    next: FrameRef,
) -> FrameResult<Analysis> {
    analyses.set(analyses.get() + 1);
    let pc = frames.unwind_address_in_block(next)?;
    let sp = frames.unwind_register_unsigned(next, SP)?;
    Ok(Analysis {
        function: symbols.lookup(pc).cloned(),
        sp,
        pc,
    })
}

/// Unwinds frames of [`MockFunction`]s of one kind.
pub struct TableUnwinder {
    pub name: &'static str,
    pub kind: FrameKind,
    pub symbols: Rc<MockSymbols>,
    pub analyses: Rc<Cell<usize>>,
    pub id_calls: Cell<usize>,
    /// Identities to report instead of the computed ones, by function start.
    pub id_overrides: RefCell<HashMap<Addr, FrameId>>,
}

impl TableUnwinder {
    pub fn new(
        name: &'static str,
        kind: FrameKind,
        symbols: Rc<MockSymbols>,
        analyses: Rc<Cell<usize>>,
    ) -> Self {
        Self {
            name,
            kind,
            symbols,
            analyses,
            id_calls: Cell::new(0),
            id_overrides: RefCell::new(HashMap::new()),
        }
    }

    pub fn override_id(&self, function: Addr, id: FrameId) {
        self.id_overrides.borrow_mut().insert(function, id);
    }

    fn analysis(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Analysis> {
        cache
            .get_or_try_insert_with(|| analyze(&self.symbols, &self.analyses, frames, next))
            .cloned()
    }
}

impl Unwinder for TableUnwinder {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> FrameKind {
        self.kind
    }

    fn sniff(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<bool> {
        let analysis = self.analysis(frames, next, cache)?;
        Ok(match &analysis.function {
            Some(func) => func.kind == self.kind,
            None => self.kind == FrameKind::Normal,
        })
    }

    fn this_id(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<FrameId> {
        self.id_calls.set(self.id_calls.get() + 1);
        let analysis = self.analysis(frames, next, cache)?;
        let (Some(func), Some(slot)) = (&analysis.function, analysis.return_slot()) else {
            return Ok(FrameId::NULL);
        };
        if let Some(id) = self.id_overrides.borrow().get(&func.start) {
            return Ok(*id);
        }
        // A zero return address marks the outermost frame.
        if frames.read_memory_unsigned(slot, 8)? == 0 {
            return Ok(FrameId::NULL);
        }
        Ok(FrameId::build(analysis.sp, func.start))
    }

    fn prev_register(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
        regnum: RegNum,
    ) -> FrameResult<RegisterValue> {
        let analysis = self.analysis(frames, next, cache)?;
        let (Some(func), Some(slot)) = (&analysis.function, analysis.return_slot()) else {
            return match regnum {
                PC => Ok(RegisterValue::optimized_out()),
                _ => frames.frame_register_unwind(next, regnum),
            };
        };
        match regnum {
            PC => Ok(RegisterValue::in_memory(slot, frames.read_memory(slot, 8)?)),
            SP => Ok(RegisterValue::computed(
                (analysis.sp + func.frame_size).to_le_bytes().to_vec(),
            )),
            R4 => Ok(RegisterValue::optimized_out()),
            _ => frames.frame_register_unwind(next, regnum),
        }
    }
}

// ── Frame base ───────────────────────────────────────────────────────────────

/// Base = caller's stack pointer; locals below it, arguments above.
pub struct TableFrameBase {
    pub shared: Option<Rc<dyn Unwinder>>,
    pub symbols: Rc<MockSymbols>,
    pub analyses: Rc<Cell<usize>>,
}

impl FrameBase for TableFrameBase {
    fn name(&self) -> &str {
        "table-base"
    }

    fn unwinder(&self) -> Option<Rc<dyn Unwinder>> {
        self.shared.clone()
    }

    fn sniff(&self, _frames: &mut FrameCache, _next: FrameRef) -> FrameResult<bool> {
        Ok(true)
    }

    fn this_base(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Addr> {
        let analysis = cache
            .get_or_try_insert_with(|| analyze(&self.symbols, &self.analyses, frames, next))?
            .clone();
        let size = analysis.function.map(|func| func.frame_size).unwrap_or(0);
        Ok(analysis.sp + size)
    }

    fn this_locals(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Addr> {
        Ok(self.this_base(frames, next, cache)? - 16)
    }

    fn this_args(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Addr> {
        Ok(self.this_base(frames, next, cache)? + 16)
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────────

/// f <- g <- main <- _start, innermost first.
pub const STANDARD_STACK: &[Addr] = &[F + 0x10, G + 0x20, MAIN + 0x30, START + 0x8];

pub fn id_f() -> FrameId {
    FrameId::build(0x7000, F)
}

pub fn id_g() -> FrameId {
    FrameId::build(0x7010, G)
}

pub fn id_main() -> FrameId {
    FrameId::build(0x7030, MAIN)
}

pub struct Fixture {
    pub frames: FrameCache,
    pub target: MockTarget,
    pub symbols: Rc<MockSymbols>,
    pub unwinder: Rc<TableUnwinder>,
    pub trampoline: Rc<TableUnwinder>,
    pub analyses: Rc<Cell<usize>>,
}

impl Fixture {
    /// The f <- g <- main <- _start stack.
    pub fn standard() -> Self {
        Self::new(STANDARD_STACK)
    }

    /// A stack whose frames resume at `pcs`, innermost first.
    pub fn new(pcs: &[Addr]) -> Self {
        Self::build(MockArch::default(), pcs, true)
    }

    pub fn build(arch: MockArch, pcs: &[Addr], shared_base: bool) -> Self {
        let symbols = Rc::new(MockSymbols::standard());
        let target = MockTarget::new();
        lay_out_stack(&target, &symbols, pcs);

        let analyses = Rc::new(Cell::new(0));
        let unwinder = Rc::new(TableUnwinder::new(
            "table",
            FrameKind::Normal,
            Rc::clone(&symbols),
            Rc::clone(&analyses),
        ));
        let trampoline = Rc::new(TableUnwinder::new(
            "sigtramp",
            FrameKind::SignalTrampoline,
            Rc::clone(&symbols),
            Rc::clone(&analyses),
        ));

        let mut unwinders = UnwinderRegistry::new();
        unwinders.append(unwinder.clone());
        unwinders.prepend(trampoline.clone());

        let shared: Option<Rc<dyn Unwinder>> = if shared_base {
            Some(unwinder.clone() as Rc<dyn Unwinder>)
        } else {
            None
        };
        let mut bases = FrameBaseRegistry::new();
        bases.append(Rc::new(TableFrameBase {
            shared,
            symbols: Rc::clone(&symbols),
            analyses: Rc::clone(&analyses),
        }));

        let frames = FrameCache::new(Box::new(target.clone()), Rc::new(arch))
            .with_symbols(symbols.clone())
            .with_unwinders(unwinders)
            .with_frame_bases(bases);

        Self {
            frames,
            target,
            symbols,
            unwinder,
            trampoline,
            analyses,
        }
    }

    /// Up to `count` frames from the current one outward, under whatever
    /// backtrace policy the cache has.
    pub fn walk(&mut self, count: usize) -> Vec<FrameRef> {
        let mut chain = vec![self.frames.current_frame().unwrap()];
        while chain.len() < count {
            let last = *chain.last().unwrap();
            match self.frames.previous_frame(Some(last)).unwrap() {
                Some(prev) => chain.push(prev),
                None => break,
            }
        }
        chain
    }
}

/// Write registers and return-address slots for a stack resuming at `pcs`.
pub fn lay_out_stack(target: &MockTarget, symbols: &MockSymbols, pcs: &[Addr]) {
    target.set_register(PC, pcs[0]);
    target.set_register(SP, INITIAL_SP);
    target.set_register(FP, LIVE_FP);
    target.set_register(R3, LIVE_R3);
    target.set_register(R4, LIVE_R4);

    let mut sp = INITIAL_SP;
    for (i, &pc) in pcs.iter().enumerate() {
        let size = symbols
            .lookup(pc)
            .map(|func| func.frame_size)
            .expect("stack pc outside every mock function");
        let caller_pc = pcs.get(i + 1).copied().unwrap_or(0);
        target.write_u64(sp + size - 8, caller_pc);
        sp += size;
    }
}
