use std::sync::{Arc, mpsc};
use std::thread;

use parred_runtime::{command::DeviceHealth, server::LaunchError};

use super::scheduler::{ResolvedLaunch, Scheduler};

/// A command buffer resolved against the storage, ready to run.
pub struct Job {
    pub launches: Vec<ResolvedLaunch>,
    pub completion: mpsc::Sender<Result<(), LaunchError>>,
}

/// The device queue: a thread running submitted jobs one after the other.
#[derive(Debug)]
pub struct Worker {
    // TODO: Run submissions that share no buffer on separate queues.
    tx: mpsc::Sender<Job>,
}

impl Worker {
    pub fn new(scheduler: Scheduler, health: Arc<DeviceHealth>) -> Self {
        let (tx, rx) = mpsc::channel();
        let inner_worker = InnerWorker {
            scheduler,
            health,
            rx,
        };
        thread::spawn(move || inner_worker.work());
        Self { tx }
    }

    /// Queue a job, giving it back if the queue thread is gone.
    pub fn send_job(&self, job: Job) -> Result<(), Job> {
        self.tx.send(job).map_err(|err| err.0)
    }
}

struct InnerWorker {
    scheduler: Scheduler,
    // Shared with the submissions, a timed out submission cancels the queued work.
    health: Arc<DeviceHealth>,
    rx: mpsc::Receiver<Job>,
}

impl InnerWorker {
    fn work(self) {
        log::trace!("Device queue started");
        for job in self.rx.iter() {
            let Job {
                launches,
                completion,
            } = job;

            let result = launches
                .iter()
                .try_for_each(|launch| self.scheduler.dispatch(launch, &self.health));

            // Release the bindings before reporting, so the host can read the buffers as soon
            // as it observes completion.
            drop(launches);
            if completion.send(result).is_err() {
                log::debug!("Submission dropped before completion was reported");
            }
        }
        log::trace!("Device queue stopped");
    }
}
