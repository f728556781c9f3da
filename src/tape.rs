//! Recording tape for reverse-mode differentiation.
//!
//! The tape is three flat vectors: a stream of partial derivatives, a stream
//! of operand slots, and one span end per recorded variable. Variable `i`'s
//! operands live at `[ends[i-1] .. ends[i])` in the streams, so recording an
//! operation appends its partials and one span end, nothing else. The reverse
//! sweep walks the spans once, multiply-accumulating adjoints. A variable is
//! written before any span that reads it, so adjoints are complete by the
//! time the sweep reaches them and nothing needs to be cleared.

use std::cell::Cell;

use crate::Float;

/// Slot of a value that never touched the tape. Constants carry this slot;
/// they take no adjoint storage and contribute no partials.
pub const UNRECORDED: u32 = u32::MAX;

pub struct Tape<F: Float> {
    /// Per recorded variable, the end of its operand span.
    ends: Vec<u32>,
    partials: Vec<F>,
    args: Vec<u32>,
}

impl<F: Float> Default for Tape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> Tape<F> {
    pub fn new() -> Self {
        Tape {
            ends: Vec::new(),
            partials: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Pre-size the streams for roughly `n_ops` recorded operations.
    pub fn with_capacity(n_ops: usize) -> Self {
        Tape {
            ends: Vec::with_capacity(n_ops),
            partials: Vec::with_capacity(n_ops * 2),
            args: Vec::with_capacity(n_ops * 2),
        }
    }

    /// Register an independent variable and return its slot.
    ///
    /// Inputs get an empty span: the sweep passes over them without
    /// distributing anything, leaving their accumulated adjoints in place
    /// for extraction.
    #[inline]
    pub fn variable(&mut self) -> u32 {
        self.seal()
    }

    /// Record `result = f(arg)` with `d = df/d(arg)`.
    #[inline]
    pub fn push_unary(&mut self, arg: u32, d: F) -> u32 {
        self.operand(arg, d);
        self.seal()
    }

    /// Record a two-operand result with both partials.
    #[inline]
    pub fn push_binary(&mut self, lhs: u32, d_lhs: F, rhs: u32, d_rhs: F) -> u32 {
        self.operand(lhs, d_lhs);
        self.operand(rhs, d_rhs);
        self.seal()
    }

    /// Record a result depending on arbitrarily many operands as a single
    /// span. Lets a kernel with a dense local Jacobian row (the taut-string
    /// projection, the Moreau envelope term) enter the tape as one variable
    /// instead of a chain of intermediates.
    #[inline]
    pub fn push_nary(&mut self, operands: impl IntoIterator<Item = (u32, F)>) -> u32 {
        for (arg, d) in operands {
            self.operand(arg, d);
        }
        self.seal()
    }

    #[inline]
    fn operand(&mut self, arg: u32, d: F) {
        if arg != UNRECORDED {
            self.partials.push(d);
            self.args.push(arg);
        }
    }

    /// Close the current span, allocating the next variable slot.
    #[inline]
    fn seal(&mut self) -> u32 {
        let slot = self.ends.len() as u32;
        self.ends.push(self.partials.len() as u32);
        slot
    }

    fn sweep(&self, adjoints: &mut [F]) {
        for i in (0..self.ends.len()).rev() {
            let a = adjoints[i];
            if a == F::zero() {
                continue;
            }
            let start = if i == 0 { 0 } else { self.ends[i - 1] as usize };
            let end = self.ends[i] as usize;
            for k in start..end {
                let arg = self.args[k] as usize;
                adjoints[arg] = adjoints[arg] + self.partials[k] * a;
            }
        }
    }

    /// Adjoints of every recorded variable with `d(seed)/d(seed) = 1`.
    pub fn reverse(&self, seed: u32) -> Vec<F> {
        let mut adjoints = vec![F::zero(); self.ends.len()];
        adjoints[seed as usize] = F::one();
        self.sweep(&mut adjoints);
        adjoints
    }

    /// Reverse sweep from caller-chosen seeds, for weighted multi-output
    /// pullbacks.
    pub fn reverse_seeded(&self, seeds: &[(u32, F)]) -> Vec<F> {
        let mut adjoints = vec![F::zero(); self.ends.len()];
        for &(slot, seed) in seeds {
            adjoints[slot as usize] = adjoints[slot as usize] + seed;
        }
        self.sweep(&mut adjoints);
        adjoints
    }
}

thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Float types with a thread-local recording slot.
pub trait ActiveTape: Float {
    fn tls() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl ActiveTape for f32 {
    fn tls() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl ActiveTape for f64 {
    fn tls() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Run `f` against the tape currently recording on this thread.
///
/// Panics when called outside a [`Recording`] scope: arithmetic on tracked
/// variables is only meaningful while a tape is listening.
#[inline]
pub fn with_tape<F: ActiveTape, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    F::tls().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "no tape is recording on this thread; wrap the computation in grad/vjp"
        );
        // SAFETY: the Recording guard keeps the pointee alive for its whole
        // scope, and thread-local access means no second reference can exist
        // while this closure runs.
        f(unsafe { &mut *ptr })
    })
}

/// Marks `tape` as the recording target for the current thread, restoring
/// whatever was recording before once dropped.
pub struct Recording<F: ActiveTape> {
    prev: *mut Tape<F>,
}

impl<F: ActiveTape> Recording<F> {
    pub fn new(tape: &mut Tape<F>) -> Self {
        let prev = F::tls().with(|cell| cell.replace(tape as *mut Tape<F>));
        Recording { prev }
    }
}

impl<F: ActiveTape> Drop for Recording<F> {
    fn drop(&mut self) {
        F::tls().with(|cell| cell.set(self.prev));
    }
}
