//! Interpreter instance: heap, registers, roots, and the host-facing API for
//! building and inspecting values.

use std::{any::Any, fs::File, path::Path};

use ahash::AHashMap;
use heap::{
    CellRef, GcStats, Heap, HeapError, HeapSettings, RootProvider, SegmentAllocator,
    SystemAllocator,
};

use crate::{
    cell::{Cell, ForeignFn, Payload},
    number::Number,
    op::Op,
    port::Port,
    primitives::PrimitiveDesc,
    symbols::SymbolTable,
    Error, Result,
};

const PRELUDE: &str = include_str!("prelude.scm");

/// Interpreter configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub heap: HeapSettings,
    /// Maximum number of files being loaded at once.
    pub max_load_depth: usize,
    /// Report every collection at `info` level.
    pub gc_verbose: bool,
    /// Start with evaluation tracing enabled.
    pub tracing: bool,
    /// Load the Scheme-level library (`map`, `for-each`, ...) at startup.
    pub prelude: bool,
    /// Longest string or vector `make-string` and `make-vector` will build.
    pub max_buffer_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            max_load_depth: 64,
            gc_verbose: false,
            tracing: false,
            prelude: true,
            max_buffer_len: 1 << 24,
        }
    }
}

/// Point-in-time counters for the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub free_cells: usize,
    pub capacity: usize,
    pub segments: usize,
    pub collections: usize,
    /// Deepest dump seen since the last reset.
    pub peak_dump_depth: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Specials {
    pub nil: CellRef,
    pub t: CellRef,
    pub f: CellRef,
    pub eof: CellRef,
    pub unspecified: CellRef,
}

/// Symbols the evaluator compares against by identity.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WellKnown {
    pub quote: CellRef,
    pub quasiquote: CellRef,
    pub unquote: CellRef,
    pub unquote_splicing: CellRef,
    pub lambda: CellRef,
    pub define: CellRef,
    pub let_: CellRef,
    pub if_: CellRef,
    pub begin: CellRef,
    pub else_: CellRef,
    pub arrow: CellRef,
    pub error_hook: CellRef,
}

/// Procedures quasiquote expansions call directly.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Builtins {
    pub cons: CellRef,
    pub list: CellRef,
    pub append: CellRef,
    pub list_to_vector: CellRef,
}

/// Registers saved around a nested evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Registers {
    pub op: Op,
    pub code: CellRef,
    pub env: CellRef,
    pub args: CellRef,
    pub value: CellRef,
    pub dump: CellRef,
    pub winders: CellRef,
    pub inport: CellRef,
    pub load_depth: usize,
    pub scratch_depth: usize,
}

impl Registers {
    fn trace(&self, visitor: &mut dyn FnMut(CellRef)) {
        for cell in [
            self.code,
            self.env,
            self.args,
            self.value,
            self.dump,
            self.winders,
            self.inport,
        ] {
            visitor(cell);
        }
    }
}

/// Everything the collector must treat as a root.
pub(crate) struct State {
    pub op: Op,
    pub code: CellRef,
    pub env: CellRef,
    pub args: CellRef,
    pub value: CellRef,
    pub dump: CellRef,
    /// Innermost-first list of `(before . after)` pairs.
    pub winders: CellRef,

    pub sp: Specials,
    pub sym: WellKnown,
    pub builtins: Builtins,
    pub symbols: SymbolTable,
    pub syntax: AHashMap<CellRef, Op>,
    pub global_env: CellRef,

    pub inport: CellRef,
    pub outport: CellRef,
    pub load_stack: Vec<CellRef>,
    /// Temporary roots for multi-step allocations.
    pub scratch: Vec<CellRef>,
    /// Host-pinned cells.
    pub pinned: Vec<CellRef>,
    pub saved: Vec<Registers>,
    /// Extra objects passed to `error`, handed to the error hook.
    pub irritants: CellRef,

    pub tracing: bool,
    pub gensym_counter: u64,
    pub peak_dump_depth: usize,
}

impl State {
    fn new(sp: Specials) -> Self {
        let nil = sp.nil;
        Self {
            op: Op::Eval,
            code: nil,
            env: nil,
            args: nil,
            value: nil,
            dump: nil,
            winders: nil,
            sp,
            sym: WellKnown {
                quote: nil,
                quasiquote: nil,
                unquote: nil,
                unquote_splicing: nil,
                lambda: nil,
                define: nil,
                let_: nil,
                if_: nil,
                begin: nil,
                else_: nil,
                arrow: nil,
                error_hook: nil,
            },
            builtins: Builtins {
                cons: nil,
                list: nil,
                append: nil,
                list_to_vector: nil,
            },
            symbols: SymbolTable::default(),
            syntax: AHashMap::new(),
            global_env: nil,
            inport: nil,
            outport: nil,
            load_stack: Vec::new(),
            scratch: Vec::new(),
            pinned: Vec::new(),
            saved: Vec::new(),
            irritants: nil,
            tracing: false,
            gensym_counter: 0,
            peak_dump_depth: 0,
        }
    }
}

impl RootProvider for State {
    fn visit_roots(&self, visitor: &mut dyn FnMut(CellRef)) {
        for cell in [
            self.code,
            self.env,
            self.args,
            self.value,
            self.dump,
            self.winders,
            self.sp.nil,
            self.sp.t,
            self.sp.f,
            self.sp.eof,
            self.sp.unspecified,
            self.global_env,
            self.inport,
            self.outport,
            self.irritants,
            self.builtins.cons,
            self.builtins.list,
            self.builtins.append,
            self.builtins.list_to_vector,
        ] {
            visitor(cell);
        }
        for symbol in self.symbols.cells() {
            visitor(symbol);
        }
        for cell in self
            .load_stack
            .iter()
            .chain(&self.scratch)
            .chain(&self.pinned)
        {
            visitor(*cell);
        }
        for registers in &self.saved {
            registers.trace(visitor);
        }
    }
}

/// Roots for the sentinels allocated before [`State`] exists.
#[derive(Default)]
struct BootstrapRoots {
    cells: Vec<CellRef>,
}

impl BootstrapRoots {
    fn allocate(&mut self, heap: &mut Heap<Cell>, payload: Payload) -> Result<CellRef> {
        let cell = heap.allocate(&*self, Cell::immutable(payload))?;
        self.cells.push(cell);
        Ok(cell)
    }
}

impl RootProvider for BootstrapRoots {
    fn visit_roots(&self, visitor: &mut dyn FnMut(CellRef)) {
        self.cells.iter().copied().for_each(visitor);
    }
}

pub struct Interpreter {
    pub(crate) heap: Heap<Cell>,
    pub(crate) st: State,
    pub(crate) primitives: Vec<PrimitiveDesc>,
    pub(crate) settings: Settings,
    external: Option<Box<dyn Any>>,
}

impl Interpreter {
    pub fn new() -> Result<Self> {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Result<Self> {
        Self::with_allocator(settings, Box::new(SystemAllocator))
    }

    /// Creates an interpreter whose heap segments come from `allocator`.
    pub fn with_allocator(settings: Settings, allocator: Box<dyn SegmentAllocator>) -> Result<Self> {
        let mut heap = Heap::with_allocator(settings.heap.clone(), allocator)?;
        heap.set_verbose(settings.gc_verbose);

        let mut boot = BootstrapRoots::default();
        let sp = Specials {
            nil: boot.allocate(&mut heap, Payload::Nil)?,
            t: boot.allocate(&mut heap, Payload::True)?,
            f: boot.allocate(&mut heap, Payload::False)?,
            eof: boot.allocate(&mut heap, Payload::Eof)?,
            unspecified: boot.allocate(&mut heap, Payload::Unspecified)?,
        };

        let mut interp = Self {
            heap,
            st: State::new(sp),
            primitives: Vec::new(),
            settings,
            external: None,
        };
        interp.st.tracing = interp.settings.tracing;
        interp.st.global_env = interp.new_frame(None)?;
        interp.st.env = interp.st.global_env;
        interp.st.inport = interp.alloc(Payload::Port(Box::new(Port::stdin())))?;
        interp.st.outport = interp.alloc(Payload::Port(Box::new(Port::stdout())))?;

        interp.install_syntax()?;
        interp.install_primitives()?;
        interp.install_globals()?;
        if interp.settings.prelude {
            interp.load_str(PRELUDE)?;
        }
        log::debug!(
            "interpreter ready: {} symbols, {} primitives, {} free cells",
            interp.st.symbols.len(),
            interp.primitives.len(),
            interp.heap.free_cells()
        );
        Ok(interp)
    }

    fn install_syntax(&mut self) -> Result<()> {
        for (name, op) in Op::SPECIAL_FORMS {
            let symbol = self.intern(name)?;
            self.st.syntax.insert(symbol, *op);
        }
        self.st.sym = WellKnown {
            quote: self.intern("quote")?,
            quasiquote: self.intern("quasiquote")?,
            unquote: self.intern("unquote")?,
            unquote_splicing: self.intern("unquote-splicing")?,
            lambda: self.intern("lambda")?,
            define: self.intern("define")?,
            let_: self.intern("let")?,
            if_: self.intern("if")?,
            begin: self.intern("begin")?,
            else_: self.intern("else")?,
            arrow: self.intern("=>")?,
            error_hook: self.intern("*error-hook*")?,
        };
        Ok(())
    }

    fn install_globals(&mut self) -> Result<()> {
        let global = self.st.global_env;
        self.define(global, self.st.sym.else_, self.st.sp.t)?;

        let builtin = |interp: &mut Self, name: &str| -> Result<CellRef> {
            let symbol = interp.intern(name)?;
            interp
                .lookup(global, symbol)
                .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
        };
        self.st.builtins = Builtins {
            cons: builtin(self, "cons")?,
            list: builtin(self, "list")?,
            append: builtin(self, "append")?,
            list_to_vector: builtin(self, "list->vector")?,
        };
        Ok(())
    }

    // ── Cells ─────────────────────────────────────────────────────────

    #[inline]
    pub(crate) fn alloc_cell(&mut self, cell: Cell) -> Result<CellRef> {
        Ok(self.heap.allocate(&self.st, cell)?)
    }

    #[inline]
    pub(crate) fn alloc(&mut self, payload: Payload) -> Result<CellRef> {
        self.alloc_cell(Cell::new(payload))
    }

    /// Makes sure the next `count` allocations cannot trigger a collection.
    /// Everything the caller still needs must already be rooted.
    #[inline]
    pub(crate) fn reserve(&mut self, count: usize) -> Result<()> {
        Ok(self.heap.reserve(&self.st, count)?)
    }

    #[inline(always)]
    pub fn payload(&self, cell: CellRef) -> &Payload {
        self.heap.get(cell).payload()
    }

    #[inline]
    pub(crate) fn payload_mut(&mut self, cell: CellRef) -> &mut Payload {
        self.heap.get_mut(cell).payload_mut()
    }

    #[inline]
    pub fn is_immutable(&self, cell: CellRef) -> bool {
        self.heap.get(cell).is_immutable()
    }

    pub fn set_immutable(&mut self, cell: CellRef) {
        self.heap.get_mut(cell).set_immutable();
    }

    /// Roots `cell` until the end of the current top-level evaluation.
    #[inline]
    pub(crate) fn protect(&mut self, cell: CellRef) -> CellRef {
        self.st.scratch.push(cell);
        cell
    }

    #[inline]
    pub fn nil(&self) -> CellRef {
        self.st.sp.nil
    }

    #[inline]
    pub fn t(&self) -> CellRef {
        self.st.sp.t
    }

    #[inline]
    pub fn f(&self) -> CellRef {
        self.st.sp.f
    }

    #[inline]
    pub fn eof(&self) -> CellRef {
        self.st.sp.eof
    }

    #[inline]
    pub fn unspecified(&self) -> CellRef {
        self.st.sp.unspecified
    }

    #[inline]
    pub fn boolean(&self, value: bool) -> CellRef {
        if value { self.st.sp.t } else { self.st.sp.f }
    }

    /// Everything except `#f` counts as true.
    #[inline]
    pub fn is_true(&self, cell: CellRef) -> bool {
        cell != self.st.sp.f
    }

    #[inline]
    pub fn is_nil(&self, cell: CellRef) -> bool {
        cell == self.st.sp.nil
    }

    pub fn global_env(&self) -> CellRef {
        self.st.global_env
    }

    pub fn cons(&mut self, car: CellRef, cdr: CellRef) -> Result<CellRef> {
        self.alloc(Payload::Pair(car, cdr))
    }

    pub fn immutable_cons(&mut self, car: CellRef, cdr: CellRef) -> Result<CellRef> {
        self.alloc_cell(Cell::immutable(Payload::Pair(car, cdr)))
    }

    #[inline]
    pub fn pair(&self, cell: CellRef) -> Option<(CellRef, CellRef)> {
        match *self.payload(cell) {
            Payload::Pair(car, cdr) => Some((car, cdr)),
            _ => None,
        }
    }

    pub fn car(&self, cell: CellRef) -> Result<CellRef> {
        self.pair(cell)
            .map(|(car, _)| car)
            .ok_or_else(|| self.wrong_type("car", "pair", cell))
    }

    pub fn cdr(&self, cell: CellRef) -> Result<CellRef> {
        self.pair(cell)
            .map(|(_, cdr)| cdr)
            .ok_or_else(|| self.wrong_type("cdr", "pair", cell))
    }

    fn set_pair_field(&mut self, name: &str, pair: CellRef, value: CellRef, car: bool) -> Result<()> {
        if self.pair(pair).is_none() {
            return Err(self.wrong_type(name, "pair", pair));
        }
        if self.is_immutable(pair) {
            return Err(Error::MutateImmutable(name.to_owned()));
        }
        if let Payload::Pair(a, d) = self.payload_mut(pair) {
            if car {
                *a = value;
            } else {
                *d = value;
            }
        }
        Ok(())
    }

    pub fn set_car(&mut self, pair: CellRef, value: CellRef) -> Result<()> {
        self.set_pair_field("set-car!", pair, value, true)
    }

    pub fn set_cdr(&mut self, pair: CellRef, value: CellRef) -> Result<()> {
        self.set_pair_field("set-cdr!", pair, value, false)
    }

    pub fn make_integer(&mut self, value: i64) -> Result<CellRef> {
        self.alloc(Payload::Integer(value))
    }

    pub fn make_real(&mut self, value: f64) -> Result<CellRef> {
        self.alloc(Payload::Real(value))
    }

    pub fn make_number(&mut self, number: Number) -> Result<CellRef> {
        match number {
            Number::Integer(i) => self.make_integer(i),
            Number::Real(r) => self.make_real(r),
        }
    }

    pub fn make_character(&mut self, value: char) -> Result<CellRef> {
        self.alloc(Payload::Character(value))
    }

    pub fn make_string(&mut self, value: impl Into<String>) -> Result<CellRef> {
        self.alloc(Payload::String(value.into()))
    }

    pub fn make_immutable_string(&mut self, value: impl Into<String>) -> Result<CellRef> {
        self.alloc_cell(Cell::immutable(Payload::String(value.into())))
    }

    pub fn make_vector(&mut self, items: Vec<CellRef>) -> Result<CellRef> {
        self.alloc(Payload::Vector(items))
    }

    pub(crate) fn buffer_too_large(&self, len: usize) -> Error {
        Error::OutOfMemory(HeapError::BufferTooLarge {
            requested: len,
            limit: self.settings.max_buffer_len,
        })
    }

    /// Storage for `len` elements outside the cell heap. Fails with
    /// `OutOfMemory` past `max_buffer_len` or when the system refuses.
    pub(crate) fn buffer<T>(&self, len: usize) -> Result<Vec<T>> {
        if len > self.settings.max_buffer_len {
            return Err(self.buffer_too_large(len));
        }
        let mut items = Vec::new();
        items
            .try_reserve_exact(len)
            .map_err(|_| self.buffer_too_large(len))?;
        Ok(items)
    }

    /// Like [`Interpreter::buffer`], for `len` copies of `fill`.
    pub(crate) fn string_buffer(&self, len: usize, fill: char) -> Result<String> {
        if len > self.settings.max_buffer_len {
            return Err(self.buffer_too_large(len));
        }
        let mut text = String::new();
        text.try_reserve_exact(len * fill.len_utf8())
            .map_err(|_| self.buffer_too_large(len))?;
        text.extend(std::iter::repeat_n(fill, len));
        Ok(text)
    }

    pub fn make_foreign(&mut self, function: ForeignFn) -> Result<CellRef> {
        self.alloc_cell(Cell::immutable(Payload::Foreign(function)))
    }

    pub fn number(&self, cell: CellRef) -> Option<Number> {
        match *self.payload(cell) {
            Payload::Integer(i) => Some(Number::Integer(i)),
            Payload::Real(r) => Some(Number::Real(r)),
            _ => None,
        }
    }

    pub fn integer_value(&self, cell: CellRef) -> Option<i64> {
        match *self.payload(cell) {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Any number as a double.
    pub fn real_value(&self, cell: CellRef) -> Option<f64> {
        self.number(cell).map(Number::to_f64)
    }

    pub fn char_value(&self, cell: CellRef) -> Option<char> {
        match *self.payload(cell) {
            Payload::Character(c) => Some(c),
            _ => None,
        }
    }

    pub fn string_value(&self, cell: CellRef) -> Option<&str> {
        match self.payload(cell) {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn symbol_name(&self, cell: CellRef) -> Option<&str> {
        match self.payload(cell) {
            Payload::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol(&self, cell: CellRef) -> bool {
        matches!(self.payload(cell), Payload::Symbol(_))
    }

    pub fn is_procedure(&self, cell: CellRef) -> bool {
        self.payload(cell).is_procedure()
    }

    // ── Lists ─────────────────────────────────────────────────────────

    /// Builds `(items ... . tail)`. The items and tail are rooted for the
    /// duration of the call.
    pub fn list_with_tail(&mut self, items: &[CellRef], tail: CellRef) -> Result<CellRef> {
        let base = self.st.scratch.len();
        self.st.scratch.extend_from_slice(items);
        self.st.scratch.push(tail);
        let built = self.reserve(items.len()).and_then(|()| {
            let mut list = tail;
            for item in items.iter().rev() {
                list = self.cons(*item, list)?;
            }
            Ok(list)
        });
        self.st.scratch.truncate(base);
        built
    }

    pub fn list_from(&mut self, items: &[CellRef]) -> Result<CellRef> {
        self.list_with_tail(items, self.st.sp.nil)
    }

    /// Length of a proper list, `None` for improper or circular lists.
    pub fn list_length(&self, list: CellRef) -> Option<usize> {
        let mut len = 0;
        let mut fast = list;
        let mut slow = list;
        loop {
            if self.is_nil(fast) {
                return Some(len);
            }
            let (_, next) = self.pair(fast)?;
            fast = next;
            len += 1;
            if self.is_nil(fast) {
                return Some(len);
            }
            let (_, next) = self.pair(fast)?;
            fast = next;
            len += 1;
            slow = self.pair(slow)?.1;
            if fast == slow {
                return None;
            }
        }
    }

    pub fn list_to_vec(&self, list: CellRef) -> Result<Vec<CellRef>> {
        let len = self
            .list_length(list)
            .ok_or_else(|| self.wrong_type("list", "proper list", list))?;
        let mut items = Vec::with_capacity(len);
        let mut cursor = list;
        while let Some((car, cdr)) = self.pair(cursor) {
            items.push(car);
            cursor = cdr;
        }
        Ok(items)
    }

    /// Fresh reversed copy of a proper list. `list` must be rooted.
    pub fn reverse(&mut self, list: CellRef) -> Result<CellRef> {
        let items = self.list_to_vec(list)?;
        self.reserve(items.len())?;
        let mut reversed = self.st.sp.nil;
        for item in items {
            reversed = self.cons(item, reversed)?;
        }
        Ok(reversed)
    }

    // ── Errors ────────────────────────────────────────────────────────

    pub(crate) fn wrong_type(&self, procedure: &str, expected: &'static str, got: CellRef) -> Error {
        let mut rendered = self.write_to_string(got);
        if rendered.chars().count() > 60 {
            rendered = rendered.chars().take(57).collect::<String>() + "...";
        }
        Error::WrongType {
            procedure: procedure.to_owned(),
            expected,
            got: rendered,
        }
    }

    // ── Host services ─────────────────────────────────────────────────

    /// Keeps `cell` alive across evaluations until [`Interpreter::unpin`].
    pub fn pin(&mut self, cell: CellRef) {
        self.st.pinned.push(cell);
    }

    /// Drops one pin on `cell`. Returns false if it was not pinned.
    pub fn unpin(&mut self, cell: CellRef) -> bool {
        match self.st.pinned.iter().rposition(|pinned| *pinned == cell) {
            Some(index) => {
                self.st.pinned.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn collect_garbage(&mut self) -> GcStats {
        self.heap.collect(&self.st)
    }

    pub fn set_gc_verbose(&mut self, verbose: bool) {
        self.heap.set_verbose(verbose);
    }

    pub fn set_tracing(&mut self, tracing: bool) {
        self.st.tracing = tracing;
    }

    pub fn stats(&self) -> Stats {
        Stats {
            free_cells: self.heap.free_cells(),
            capacity: self.heap.capacity(),
            segments: self.heap.segment_count(),
            collections: self.heap.collections(),
            peak_dump_depth: self.st.peak_dump_depth,
        }
    }

    pub fn reset_peak_dump_depth(&mut self) {
        self.st.peak_dump_depth = 0;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Attaches arbitrary host data, retrievable from foreign functions.
    pub fn set_external_data<T: Any>(&mut self, data: T) {
        self.external = Some(Box::new(data));
    }

    pub fn external_data<T: Any>(&self) -> Option<&T> {
        self.external.as_ref()?.downcast_ref()
    }

    pub fn external_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.external.as_mut()?.downcast_mut()
    }

    /// Binds each `(name, function)` pair in the global environment.
    pub fn register_foreign_functions(&mut self, functions: &[(&str, ForeignFn)]) -> Result<()> {
        let global = self.st.global_env;
        for (name, function) in functions {
            let symbol = self.intern(name)?;
            let cell = self.make_foreign(*function)?;
            self.define(global, symbol, cell)?;
        }
        Ok(())
    }

    pub fn define_global(&mut self, name: &str, value: CellRef) -> Result<()> {
        self.protect(value);
        let symbol = self.intern(name)?;
        self.st.scratch.pop();
        let global = self.st.global_env;
        self.define(global, symbol, value)
    }

    pub fn lookup_global(&self, name: &str) -> Option<CellRef> {
        let symbol = self.st.symbols.get(name)?;
        self.lookup(self.st.global_env, symbol)
    }

    // ── Ports ─────────────────────────────────────────────────────────

    pub(crate) fn port_mut(&mut self, cell: CellRef, procedure: &str) -> Result<&mut Port> {
        match self.payload_mut(cell) {
            Payload::Port(port) => Ok(port),
            other => Err(Error::WrongType {
                procedure: procedure.to_owned(),
                expected: "port",
                got: other.kind_name().into(),
            }),
        }
    }

    pub(crate) fn make_port(&mut self, port: Port) -> Result<CellRef> {
        self.alloc(Payload::Port(Box::new(port)))
    }

    pub fn set_input_port(&mut self, port: Port) -> Result<()> {
        self.st.inport = self.make_port(port)?;
        Ok(())
    }

    pub fn set_output_port(&mut self, port: Port) -> Result<()> {
        if let Ok(current) = self.port_mut(self.st.outport, "set-output-port") {
            current.flush()?;
        }
        self.st.outport = self.make_port(port)?;
        Ok(())
    }

    pub fn set_input_port_file(&mut self, file: File, name: &str) -> Result<()> {
        self.set_input_port(Port::input_file(file, name))
    }

    pub fn set_input_port_string(&mut self, text: &str) -> Result<()> {
        self.set_input_port(Port::input_string(text))
    }

    pub fn set_output_port_file(&mut self, file: File, name: &str) -> Result<()> {
        self.set_output_port(Port::output_file(file, name))
    }

    /// Redirects output into an in-memory buffer, see [`Interpreter::take_output`].
    pub fn set_output_port_string(&mut self) -> Result<()> {
        self.set_output_port(Port::output_string())
    }

    /// Drains the current output port if it is a string port.
    pub fn take_output(&mut self) -> Option<String> {
        self.port_mut(self.st.outport, "take-output").ok()?.take_output()
    }

    pub fn flush_output(&mut self) -> Result<()> {
        Ok(self.port_mut(self.st.outport, "flush-output")?.flush()?)
    }

    /// Writes text to the current output port.
    pub fn write_output(&mut self, text: &str) -> Result<()> {
        Ok(self.port_mut(self.st.outport, "write")?.write_str(text)?)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<CellRef> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let port = Port::input_file(file, path.display().to_string());
        self.load_port(port)
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if let Err(err) = self.flush_output() {
            log::warn!("flushing output failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cons_reads_back_and_survives_collection() {
        let mut interp = Interpreter::new().unwrap();
        let one = interp.make_integer(1).unwrap();
        let pair = interp.cons(one, interp.nil()).unwrap();
        interp.pin(pair);
        interp.collect_garbage();
        assert_eq!(interp.car(pair).unwrap(), one);
        assert_eq!(interp.cdr(pair).unwrap(), interp.nil());
        assert_eq!(interp.integer_value(one), Some(1));
    }

    #[test]
    fn immutable_pairs_reject_mutation() {
        let mut interp = Interpreter::new().unwrap();
        let pair = interp.immutable_cons(interp.t(), interp.nil()).unwrap();
        assert!(matches!(
            interp.set_car(pair, interp.f()),
            Err(Error::MutateImmutable(name)) if name == "set-car!"
        ));
        assert_eq!(interp.car(pair).unwrap(), interp.t());
    }

    #[test]
    fn list_length_detects_cycles() {
        let mut interp = Interpreter::new().unwrap();
        let a = interp.make_integer(1).unwrap();
        let list = interp.list_from(&[a, a, a]).unwrap();
        interp.pin(list);
        assert_eq!(interp.list_length(list), Some(3));
        let last = interp.cdr(interp.cdr(list).unwrap()).unwrap();
        interp.set_cdr(last, list).unwrap();
        assert_eq!(interp.list_length(list), None);
        let improper = interp.cons(a, a).unwrap();
        assert_eq!(interp.list_length(improper), None);
    }

    #[test]
    fn unpinned_cells_are_reclaimed() {
        let mut interp = Interpreter::new().unwrap();
        let before = interp.collect_garbage().free;
        let cell = interp.make_string("temporary").unwrap();
        interp.pin(cell);
        assert_eq!(interp.collect_garbage().free, before - 1);
        assert!(interp.unpin(cell));
        assert!(!interp.unpin(cell));
        assert_eq!(interp.collect_garbage().free, before);
    }

    #[test]
    fn external_data_round_trip() {
        let mut interp = Interpreter::new().unwrap();
        interp.set_external_data(vec![1u8, 2, 3]);
        interp.external_data_mut::<Vec<u8>>().unwrap().push(4);
        assert_eq!(interp.external_data::<Vec<u8>>(), Some(&vec![1, 2, 3, 4]));
        assert!(interp.external_data::<String>().is_none());
    }
}
