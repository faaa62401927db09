//! Reverse-mode tape.
//!
//! The forward sweep records one node per tracked intermediate, holding the
//! indices of its (at most two) parents and the precomputed local partial
//! derivatives with respect to them. The reverse sweep is a single
//! multiply-accumulate loop over the nodes in reverse order, skipping nodes
//! whose adjoint is still zero. Used internally by [`crate::ad::Var`].

use std::cell::Cell;

use crate::ad::Real;

/// Node index marking a value that is not recorded on any tape.
pub const UNTRACKED: u32 = u32::MAX;

/// One recorded operation: parent indices and the partial derivative of the
/// result with respect to each parent. Leaves have no parents.
#[derive(Clone, Copy, Debug)]
struct Node<F> {
    parents: [u32; 2],
    partials: [F; 2],
}

/// Gradient tape for reverse-mode differentiation.
///
/// Nodes are pushed in evaluation order, so every node's parents precede it
/// and a single reverse pass computes all adjoints.
pub struct Tape<F: Real> {
    nodes: Vec<Node<F>>,
}

impl<F: Real> Default for Tape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Real> Tape<F> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Tape { nodes: Vec::new() }
    }

    /// Create a tape with room for roughly `est_nodes` recorded operations.
    pub fn with_capacity(est_nodes: usize) -> Self {
        Tape {
            nodes: Vec::with_capacity(est_nodes),
        }
    }

    /// Number of nodes recorded so far (inputs included).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register an independent variable and return its node index.
    #[inline]
    pub fn variable(&mut self) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            parents: [UNTRACKED, UNTRACKED],
            partials: [F::zero(), F::zero()],
        });
        idx
    }

    /// Record `result = f(parent)` with `partial = df/d(parent)`.
    ///
    /// The caller guarantees `parent != UNTRACKED`; untracked operands are
    /// folded away before reaching the tape.
    #[inline]
    pub fn unary(&mut self, parent: u32, partial: F) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            parents: [parent, UNTRACKED],
            partials: [partial, F::zero()],
        });
        idx
    }

    /// Record `result = f(a, b)` with the two local partial derivatives.
    ///
    /// Either parent (but not both) may be `UNTRACKED`.
    #[inline]
    pub fn binary(&mut self, a: u32, da: F, b: u32, db: F) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            parents: [a, b],
            partials: [da, db],
        });
        idx
    }

    /// Reverse sweep: seed the adjoint of `seed` with one and propagate to
    /// every node. Returns the full adjoint vector, indexed by node.
    pub fn adjoints(&self, seed: u32) -> Vec<F> {
        let mut adj = vec![F::zero(); self.nodes.len()];
        adj[seed as usize] = F::one();

        for i in (0..self.nodes.len()).rev() {
            let a = adj[i];
            if a == F::zero() {
                continue;
            }
            let node = self.nodes[i];
            for k in 0..2 {
                let p = node.parents[k];
                if p != UNTRACKED {
                    adj[p as usize] = adj[p as usize] + node.partials[k] * a;
                }
            }
        }
        adj
    }
}

// Thread-local active tape, one slot per base float type. A raw pointer
// rather than a RefCell: the scope guard bounds its validity.
thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local tape slot for a base float type.
pub trait TapeHook: Real {
    fn slot() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeHook for f32 {
    fn slot() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl TapeHook for f64 {
    fn slot() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Run `f` against the active tape for the current thread.
///
/// # Panics
///
/// Panics if no [`TapeScope`] is active.
#[inline]
pub fn with_tape<F: TapeHook, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    F::slot().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "no active tape; wrap the computation in a TapeScope or use ad::grad"
        );
        // SAFETY: TapeScope set this pointer from a live &mut Tape and clears
        // it on drop; the thread-local guarantees exclusive access.
        let tape = unsafe { &mut *ptr };
        f(tape)
    })
}

/// RAII guard installing a tape as the thread's active tape.
///
/// The previous tape (if any) is restored on drop, so scopes nest.
pub struct TapeScope<F: TapeHook> {
    prev: *mut Tape<F>,
}

impl<F: TapeHook> TapeScope<F> {
    pub fn new(tape: &mut Tape<F>) -> Self {
        let prev = F::slot().with(|cell| {
            let prev = cell.get();
            cell.set(tape as *mut Tape<F>);
            prev
        });
        TapeScope { prev }
    }
}

impl<F: TapeHook> Drop for TapeScope<F> {
    fn drop(&mut self) {
        F::slot().with(|cell| {
            cell.set(self.prev);
        });
    }
}
