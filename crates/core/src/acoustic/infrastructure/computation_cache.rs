use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Shape signature of one chunk evaluation.
///
/// `left` and `right` count the input frames the window holds before the
/// first and after the last output frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkShape {
    pub output_frames: usize,
    pub left: usize,
    pub right: usize,
}

impl ChunkShape {
    pub fn window_frames(&self) -> usize {
        self.left + self.output_frames + self.right
    }
}

/// Precompiled gather plan for a [`ChunkShape`].
///
/// Row `r` of the spliced network input is the concatenation of window rows
/// `row_indices[r * splice_width .. (r + 1) * splice_width]`.
#[derive(Debug, PartialEq, Eq)]
pub struct ChunkComputation {
    pub shape: ChunkShape,
    pub splice_width: usize,
    pub row_indices: Vec<usize>,
}

impl ChunkComputation {
    /// Compiles the plan for a network with `model_left`/`model_right`
    /// splice context. `shape.left` must be at least `model_left`.
    pub fn compile(shape: ChunkShape, model_left: usize, model_right: usize) -> Self {
        let splice_width = model_left + model_right + 1;
        let first = shape.left - model_left;
        let mut row_indices = Vec::with_capacity(shape.output_frames * splice_width);
        for r in 0..shape.output_frames {
            row_indices.extend((0..splice_width).map(|j| first + r + j));
        }
        Self {
            shape,
            splice_width,
            row_indices,
        }
    }
}

/// Shape-keyed store of compiled chunk computations, shared by all workers.
///
/// Lookups take a read lock only. A miss compiles under a separate mutex and
/// rechecks the map first, so each shape is compiled exactly once. Growth is
/// bounded by the number of distinct shapes, not by utterance count.
#[derive(Default)]
pub struct ComputationCache {
    entries: RwLock<HashMap<ChunkShape, Arc<ChunkComputation>>>,
    compile_lock: Mutex<()>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ComputationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile<F>(&self, shape: ChunkShape, compile: F) -> Arc<ChunkComputation>
    where
        F: FnOnce() -> ChunkComputation,
    {
        if let Some(found) = self.lookup(&shape) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found;
        }

        let _guard = self
            .compile_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = self.lookup(&shape) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let computation = Arc::new(compile());
        log::debug!(
            "Compiled chunk computation: {} frames, context {}+{}",
            shape.output_frames,
            shape.left,
            shape.right
        );
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(shape, Arc::clone(&computation));
        computation
    }

    fn lookup(&self, shape: &ChunkShape) -> Option<Arc<ChunkComputation>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shape)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}
