//! Background jobs for remote generation and heavy pixel passes. Results come back over
//! channels and are picked up by polling from the interaction thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

/// Shared "stop listening" flag. Work already in flight finishes; its result is ignored.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handed to a running job for progress messages and cancellation checks.
#[derive(Debug)]
pub struct JobContext<M> {
    messages: Sender<M>,
    cancel: CancelFlag,
}

impl<M> JobContext<M> {
    /// A context with no job behind it, for running job bodies directly.
    pub fn detached() -> (Self, Receiver<M>) {
        let (messages, receiver) = mpsc::channel();
        let context = Self {
            messages,
            cancel: CancelFlag::new(),
        };
        (context, receiver)
    }

    /// Sends a message to the owner; a dropped owner is not an error.
    pub fn send(&self, message: M) {
        let _ = self.messages.send(message);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobExecutor {
    /// One OS thread per job.
    #[default]
    Threaded,
    /// Runs the job to completion inside `spawn`; used headless and in tests.
    Inline,
}

impl JobExecutor {
    pub fn spawn<T, M, W>(self, name: &'static str, work: W) -> JobHandle<T, M>
    where
        T: Send + 'static,
        M: Send + 'static,
        W: FnOnce(&JobContext<M>) -> T + Send + 'static,
    {
        let (message_tx, message_rx) = mpsc::channel::<M>();
        let (result_tx, result_rx) = mpsc::channel::<T>();
        let cancel = CancelFlag::new();
        let context = JobContext {
            messages: message_tx,
            cancel: cancel.clone(),
        };
        tracing::debug!(job = name, executor = ?self, "starting job");

        match self {
            Self::Threaded => {
                let spawned = std::thread::Builder::new()
                    .name(format!("brushcanvas-{name}"))
                    .spawn(move || {
                        let result = work(&context);
                        let _ = result_tx.send(result);
                    });
                if let Err(err) = spawned {
                    tracing::warn!(?err, job = name, "failed to spawn worker thread");
                }
            }
            Self::Inline => {
                let result = work(&context);
                let _ = result_tx.send(result);
            }
        }

        JobHandle {
            name,
            messages: message_rx,
            result: result_rx,
            cancel,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobPoll<T> {
    Pending,
    Finished(T),
    /// The worker went away without a result.
    Lost,
}

#[derive(Debug)]
pub struct JobHandle<T, M> {
    name: &'static str,
    messages: Receiver<M>,
    result: Receiver<T>,
    cancel: CancelFlag,
}

impl<T, M> JobHandle<T, M> {
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Messages sent since the last call, in order.
    pub fn drain_messages(&self) -> Vec<M> {
        let mut drained = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            drained.push(message);
        }
        drained
    }

    pub fn try_result(&self) -> JobPoll<T> {
        match self.result.try_recv() {
            Ok(result) => JobPoll::Finished(result),
            Err(TryRecvError::Empty) => JobPoll::Pending,
            Err(TryRecvError::Disconnected) => JobPoll::Lost,
        }
    }

    pub fn cancel(&self) {
        tracing::debug!(job = self.name, "cancelling job");
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl<T, M> Drop for JobHandle<T, M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn inline_job_is_finished_on_first_poll() {
        let handle = JobExecutor::Inline.spawn("sum", |context: &JobContext<u32>| {
            context.send(1);
            context.send(2);
            3u32
        });

        assert_eq!(handle.drain_messages(), vec![1, 2]);
        assert_eq!(handle.try_result(), JobPoll::Finished(3));
        assert_eq!(handle.try_result(), JobPoll::Lost);
    }

    #[test]
    fn threaded_job_delivers_result() {
        let handle = JobExecutor::Threaded.spawn("wait", |_: &JobContext<()>| 42u8);

        let mut result = JobPoll::Pending;
        for _ in 0..500 {
            result = handle.try_result();
            if result != JobPoll::Pending {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(result, JobPoll::Finished(42));
    }

    #[test]
    fn cancel_is_visible_to_the_job() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let handle = JobExecutor::Threaded.spawn("cancel", move |context: &JobContext<()>| {
            while !context.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = seen_tx.send(true);
        });

        handle.cancel();

        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(5)),
            Ok(true),
            "job should observe cancellation"
        );
    }
}
