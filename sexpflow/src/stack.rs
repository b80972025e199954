//! Stack safety for deep recursion.
//!
//! Reading and evaluating deeply nested expressions recurses once per
//! nesting level. Recursive entry points wrap themselves in
//! [`ensure_sufficient_stack`], which grows the stack on native targets.

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Stack reserved per nesting level when running the generated grammar.
const STACK_PER_NESTING_LEVEL: usize = 16 * 1024;

/// Nesting depth below which the grammar runs on the current stack.
const SHALLOW_NESTING: usize = 256;

/// Ensure sufficient stack space is available before executing `f`.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM version - just call directly (WASM has its own stack management).
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Run `f` on a stack sized for input nested `depth` levels deep.
///
/// The pest-generated parser recurses without checkpoints, so the whole
/// parse gets a dedicated segment up front.
#[cfg(not(target_arch = "wasm32"))]
pub fn with_nesting_stack<R>(depth: usize, f: impl FnOnce() -> R) -> R {
    if depth < SHALLOW_NESTING {
        return f();
    }
    let size = STACK_PER_RECURSION + depth.saturating_mul(STACK_PER_NESTING_LEVEL);
    stacker::grow(size, f)
}

#[cfg(target_arch = "wasm32")]
pub fn with_nesting_stack<R>(_depth: usize, f: impl FnOnce() -> R) -> R {
    f()
}
