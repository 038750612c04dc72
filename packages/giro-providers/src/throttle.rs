use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::Semaphore, time};

/// Shared politeness gate for outbound provider calls: bounded concurrency
/// plus a mandatory delay before each permit is returned. The provider
/// enforces a global rate policy, so one limiter is shared by every
/// concurrent caller within a run.
#[derive(Clone)]
pub struct RateLimiter {
	permits: Arc<Semaphore>,
	delay: Duration,
}
impl RateLimiter {
	pub fn new(concurrency: u32, delay: Duration) -> Self {
		Self { permits: Arc::new(Semaphore::new(concurrency.max(1) as usize)), delay }
	}

	/// Run `fut` under a permit, holding the permit through the mandatory
	/// delay so back-to-back calls on the same slot are spaced out.
	pub async fn run<F, T>(&self, fut: F) -> T
	where
		F: Future<Output = T>,
	{
		let _permit = self.permits.acquire().await.expect("limiter semaphore is never closed");
		let out = fut.await;

		time::sleep(self.delay).await;

		out
	}
}
