//! Background worker for long computations
//!
//! A job runs on its own thread and owns everything it computes with,
//! including the engine. The caller polls or blocks on a status channel;
//! cancelling sets the shared token observed at every checkpoint.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::core::error::CalcError;
use crate::core::progress::{CancelToken, Checkpoint, Progress};

/// Message sent from the worker thread
#[derive(Debug)]
pub enum WorkerEvent<T> {
    Progress(Progress),
    Done(Result<T, CalcError>),
}

/// Where a polled job stands
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Running(Option<Progress>),
    Finished,
}

pub struct JobHandle<T> {
    label: String,
    cancel: CancelToken,
    events: Receiver<WorkerEvent<T>>,
    thread: Option<JoinHandle<()>>,
    last: Option<Progress>,
    outcome: Option<Result<T, CalcError>>,
}

/// Run `job` on a worker thread
pub fn spawn<T, F>(label: &str, job: F) -> Result<JobHandle<T>, CalcError>
where
    T: Send + 'static,
    F: FnOnce(&mut Checkpoint<'_>) -> Result<T, CalcError> + Send + 'static,
{
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel();
    let token = cancel.clone();
    let name = format!("abcalc-{}", label);
    let thread = thread::Builder::new().name(name).spawn(move || {
        let progress_tx = tx.clone();
        let mut checkpoint = Checkpoint::new(token).with_progress(move |p| {
            // receiver gone means nobody is listening any more
            let _ = progress_tx.send(WorkerEvent::Progress(p.clone()));
        });
        let outcome = job(&mut checkpoint);
        let _ = tx.send(WorkerEvent::Done(outcome));
    })?;
    tracing::debug!(job = label, "worker started");
    Ok(JobHandle {
        label: label.to_string(),
        cancel,
        events: rx,
        thread: Some(thread),
        last: None,
        outcome: None,
    })
}

impl<T> JobHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Request cooperative cancellation; the job ends at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Drain pending events without blocking
    pub fn poll(&mut self) -> JobStatus {
        if self.outcome.is_some() {
            return JobStatus::Finished;
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if self.record(event) {
                        return JobStatus::Finished;
                    }
                }
                Err(TryRecvError::Empty) => return JobStatus::Running(self.last.clone()),
                Err(TryRecvError::Disconnected) => {
                    self.outcome = Some(Err(self.lost()));
                    return JobStatus::Finished;
                }
            }
        }
    }

    /// Block until the job ends, calling `on_progress` for every report
    pub fn wait_with(mut self, mut on_progress: impl FnMut(&Progress)) -> Result<T, CalcError> {
        while self.outcome.is_none() {
            match self.events.recv() {
                Ok(WorkerEvent::Progress(p)) => {
                    on_progress(&p);
                    self.last = Some(p);
                }
                Ok(WorkerEvent::Done(outcome)) => self.outcome = Some(outcome),
                Err(_) => self.outcome = Some(Err(self.lost())),
            }
        }
        self.finish()
    }

    /// Block until the job ends
    pub fn wait(self) -> Result<T, CalcError> {
        self.wait_with(|_| {})
    }

    fn record(&mut self, event: WorkerEvent<T>) -> bool {
        match event {
            WorkerEvent::Progress(p) => {
                self.last = Some(p);
                false
            }
            WorkerEvent::Done(outcome) => {
                self.outcome = Some(outcome);
                true
            }
        }
    }

    fn lost(&self) -> CalcError {
        CalcError::Store(format!("worker '{}' stopped without a result", self.label))
    }

    fn finish(mut self) -> Result<T, CalcError> {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(CalcError::Store(format!("worker '{}' panicked", self.label)));
            }
        }
        let outcome = self.outcome.take().unwrap_or_else(|| Err(self.lost()));
        tracing::debug!(job = %self.label, ok = outcome.is_ok(), "worker finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use std::sync::mpsc as channel;
    use std::time::Duration;

    #[test]
    fn test_wait_returns_result_and_progress() {
        let handle = spawn("sum", |cp| {
            let mut total = 0;
            for i in 0..5 {
                cp.step(i + 1, 5, "adding")?;
                total += i;
            }
            Ok(total)
        })
        .unwrap();
        let mut seen = Vec::new();
        let total = handle.wait_with(|p| seen.push(p.current)).unwrap();
        assert_eq!(total, 10);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_cancel_stops_job() {
        let (started_tx, started_rx) = channel::channel();
        let handle = spawn::<(), _>("forever", move |cp| {
            let _ = started_tx.send(());
            let mut i = 0;
            loop {
                cp.step(i, 0, "spinning")?;
                i += 1;
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        started_rx.recv().unwrap();
        handle.cancel();
        let err = handle.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_poll_until_finished() {
        let mut handle = spawn("quick", |_| Ok("done")).unwrap();
        while handle.poll() != JobStatus::Finished {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.wait().unwrap(), "done");
    }
}
