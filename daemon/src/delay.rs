use std::time::Duration;

/// Source of the controller's waits
pub trait Delay {
    async fn sleep(&mut self, duration: Duration);
}

/// Real-time delays on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
