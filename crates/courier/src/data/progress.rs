/// Receives transfer progress as a fraction in `[0.0, 1.0]`.
///
/// Values delivered to one observer for one transfer never decrease.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: f32);
}

impl<F> ProgressObserver for F
where
    F: Fn(f32) + Send + Sync,
{
    fn on_progress(&self, progress: f32) { self(progress) }
}
