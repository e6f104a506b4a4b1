use tokio::time::Instant;
use tracing::trace;

/// Emits the duration of a client operation on the `timing` target when dropped.
pub(crate) struct ScopedTimer<'a> {
    start: Instant,
    op: &'static str,
    path: &'a str,
}

impl<'a> ScopedTimer<'a> {
    pub(crate) fn new(
        op: &'static str,
        path: &'a str,
    ) -> Self {
        Self {
            start: Instant::now(),
            op,
            path,
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        trace!(target: "timing", op = self.op, path = self.path, "[TIMING] {} took {} ms", self.op, elapsed.as_millis());
    }
}
