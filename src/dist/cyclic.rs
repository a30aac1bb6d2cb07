//! Block-cyclic index arithmetic.
//!
//! Every distribution in this crate reduces, per axis, to the same scheme:
//! global indices are grouped into blocks of `block` consecutive entries, and
//! block `b` lives at position `(align + b) mod stride` among the `stride`
//! positions of that axis. `block == 1` is the elementwise case and `stride
//! == 1` is full replication, so one set of functions serves every tag.
//!
//! All functions here are pure; the communicator layer never appears. The
//! packing routines consume [`owned_runs`] so that block size stays a plain
//! parameter rather than a special case.

/// First block index owned by `position` on an axis with the given alignment.
///
/// With `block == 1` this is also the first owned global index.
pub fn shift(position: usize, align: usize, stride: usize) -> usize {
    debug_assert!(position < stride && align < stride);
    (position + stride - align) % stride
}

/// Position owning the block containing `global`.
pub fn owner(global: usize, block: usize, align: usize, stride: usize) -> usize {
    (align + global / block) % stride
}

/// Number of indices owned by a position with block-shift `shift` when the
/// axis is elementwise (`block == 1`).
///
/// This is `ceil((extent - shift) / stride)` clamped at zero; the same
/// formula counts owned *blocks* when called with block-granular arguments.
pub fn length(extent: usize, shift: usize, stride: usize) -> usize {
    if extent > shift {
        (extent - shift).div_ceil(stride)
    } else {
        0
    }
}

/// Number of indices owned by a position with block-shift `shift` on an axis
/// of `extent` entries grouped into blocks of `block`.
///
/// The final global block may be short; only the position owning it sees the
/// truncation.
pub fn local_length(extent: usize, shift: usize, block: usize, stride: usize) -> usize {
    let nblocks = extent.div_ceil(block);
    let owned = length(nblocks, shift, stride);
    if owned == 0 {
        return 0;
    }
    let mut len = owned * block;
    let last_owned = shift + (owned - 1) * stride;
    if last_owned == nblocks - 1 {
        len -= nblocks * block - extent;
    }
    len
}

/// Global index of local index `local` on a position with block-shift `shift`.
pub fn local_to_global(local: usize, shift: usize, block: usize, stride: usize) -> usize {
    (shift + (local / block) * stride) * block + local % block
}

/// Local index of `global` on the position that owns it.
///
/// The caller must have checked ownership with [`owner`]; for a non-owned
/// index the result is meaningless.
pub fn global_to_local(global: usize, shift: usize, block: usize, stride: usize) -> usize {
    ((global / block - shift) / stride) * block + global % block
}

/// Iterator over the contiguous `(global_start, len)` runs owned by one
/// position of an axis.
///
/// Runs appear in increasing global order and are pairwise disjoint; their
/// lengths sum to [`local_length`]. A fully replicated axis (`stride == 1`)
/// yields a single run covering the whole extent.
#[derive(Debug, Clone)]
pub struct OwnedRuns {
    extent: usize,
    next_start: usize,
    run: usize,
    step: usize,
}

/// Runs owned by the position whose block-shift is `shift`.
pub fn owned_runs(extent: usize, shift: usize, block: usize, stride: usize) -> OwnedRuns {
    if stride == 1 {
        // One position owns everything; emit it as one run.
        OwnedRuns { extent, next_start: 0, run: extent, step: extent.max(1) }
    } else {
        OwnedRuns {
            extent,
            next_start: shift * block,
            run: block,
            step: stride * block,
        }
    }
}

impl Iterator for OwnedRuns {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        if self.next_start >= self.extent {
            return None;
        }
        let start = self.next_start;
        let len = self.run.min(self.extent - start);
        self.next_start += self.step;
        Some((start, len))
    }
}
