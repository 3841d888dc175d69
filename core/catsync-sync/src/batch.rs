/// Accumulates items into fixed-size batches.
///
/// [`push`](Batcher::push) hands back a full batch as soon as the threshold
/// is reached; [`finish`](Batcher::finish) returns the remainder, if any.
#[derive(Debug)]
pub struct Batcher<T> {
    size: usize,
    pending: Vec<T>,
}

impl<T> Batcher<T> {
    /// A batcher flushing every `size` items (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            pending: Vec::with_capacity(size),
        }
    }

    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.pending.push(item);
        if self.pending.len() >= self.size {
            Some(std::mem::replace(
                &mut self.pending,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    pub fn finish(self) -> Option<Vec<T>> {
        (!self.pending.is_empty()).then_some(self.pending)
    }

    /// Items buffered but not yet flushed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
