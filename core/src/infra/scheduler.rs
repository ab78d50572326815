//! Host scheduling primitives
//!
//! Live player state belongs to the host's single owner thread. Store I/O runs on the tokio
//! runtime. [`TaskScheduler`] is the seam between the two: sync code never touches live state
//! except from a task handed to [`TaskScheduler::run_on_main`].

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// A unit of work that must run on the host's owner thread
pub type MainTask = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskScheduler: Send + Sync {
	/// Run `task` on the owner thread once `delay` has elapsed
	fn run_later(&self, delay: Duration, task: MainTask);

	/// Run `future` off the owner thread
	fn run_async(&self, future: BoxFuture<'static, ()>);

	/// Run `task` on the owner thread at the next opportunity
	fn run_on_main(&self, task: MainTask);
}

/// Scheduler backed by a tokio runtime and a queue the host drains every tick
#[derive(Clone)]
pub struct QueueScheduler {
	runtime: Handle,
	main_tx: mpsc::UnboundedSender<MainTask>,
}

/// Receiving end of the owner-thread queue, held by the host
pub struct MainThreadQueue {
	rx: mpsc::UnboundedReceiver<MainTask>,
}

impl QueueScheduler {
	pub fn new(runtime: Handle) -> (Self, MainThreadQueue) {
		let (main_tx, rx) = mpsc::unbounded_channel();
		(Self { runtime, main_tx }, MainThreadQueue { rx })
	}

	fn enqueue(tx: &mpsc::UnboundedSender<MainTask>, task: MainTask) {
		if tx.send(task).is_err() {
			warn!("Owner-thread queue closed, dropping task");
		}
	}
}

impl TaskScheduler for QueueScheduler {
	fn run_later(&self, delay: Duration, task: MainTask) {
		let tx = self.main_tx.clone();
		self.runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			Self::enqueue(&tx, task);
		});
	}

	fn run_async(&self, future: BoxFuture<'static, ()>) {
		self.runtime.spawn(future);
	}

	fn run_on_main(&self, task: MainTask) {
		Self::enqueue(&self.main_tx, task);
	}
}

impl MainThreadQueue {
	/// Run every task queued so far; call from the owner thread once per tick
	pub fn run_pending(&mut self) -> usize {
		let mut ran = 0;
		while let Ok(task) = self.rx.try_recv() {
			task();
			ran += 1;
		}
		if ran > 0 {
			trace!(tasks = ran, "Ran owner-thread tasks");
		}
		ran
	}

	/// Wait for at least one task, then drain the queue
	pub async fn run_next(&mut self) -> usize {
		match self.rx.recv().await {
			Some(task) => {
				task();
				1 + self.run_pending()
			}
			None => 0,
		}
	}
}
