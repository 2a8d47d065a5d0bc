//! Distributed compute backend.
//!
//! Dipoles are dealt round-robin to a fixed set of workers, dipole `i`
//! going to worker `i % workers`. Every worker owns a full replica of the
//! simulation. Per step each worker:
//!
//! - computes the updates of the dipoles it owns from its replica;
//! - sends them to every peer;
//! - receives the updates of every peer for the same step;
//! - applies all updates to its replica in dipole order.
//!
//! Receiving one message from each peer is the step barrier: no worker
//! applies step `n` before every peer has computed it. Workers exchange
//! messages over `std::sync::mpsc` channels; a failing worker broadcasts an
//! abort so that no peer waits on it.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use wiechert_core::integrator::ProgressLog;
use wiechert_core::{DipoleUpdate, RunConfig, RunSummary, Simulation, SimulationError};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

#[derive(Debug, Clone)]
enum StepMessage {
    Updates {
        worker: usize,
        step: usize,
        updates: Vec<(usize, DipoleUpdate)>,
    },
    /// The sender stopped. `None` means it stopped without a simulation error.
    Abort {
        worker: usize,
        error: Option<SimulationError>,
    },
}

/// Outgoing channels of one worker. Broadcasts an abort if the worker
/// unwinds.
struct Outbox {
    rank: usize,
    peers: Vec<Sender<StepMessage>>,
}

impl Outbox {
    fn broadcast(&self, message: &StepMessage) {
        for peer in &self.peers {
            // A closed channel means that peer already stopped.
            let _ = peer.send(message.clone());
        }
    }

    fn abort(&self, error: Option<SimulationError>) {
        self.broadcast(&StepMessage::Abort {
            worker: self.rank,
            error,
        });
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        if thread::panicking() {
            self.abort(None);
        }
    }
}

enum Failure {
    /// Raised by this worker's own computation.
    Own(ComputeError),
    /// Reported by, or caused by the loss of, a peer.
    Peer(ComputeError),
}

struct Worker<'a> {
    rank: usize,
    workers: usize,
    replica: Simulation,
    inbox: Receiver<StepMessage>,
    outbox: Outbox,
    config: &'a RunConfig,
    /// Updates that arrived one step early, keyed by sender.
    deferred: Vec<(usize, Vec<(usize, DipoleUpdate)>)>,
}

impl Worker<'_> {
    fn owned(&self) -> impl Iterator<Item = usize> {
        (self.rank..self.replica.dipole_count()).step_by(self.workers)
    }

    fn run(&mut self, steps: usize) -> Result<(), Failure> {
        let progress = ProgressLog::new(steps);
        for tstep in 0..steps {
            let mine = self
                .owned()
                .map(|i| self.replica.compute_update(i, tstep, self.config).map(|u| (i, u)))
                .collect::<Result<Vec<_>, _>>();
            let mine = match mine {
                Ok(updates) => updates,
                Err(err) => {
                    self.outbox.abort(Some(err.clone()));
                    return Err(Failure::Own(err.into()));
                }
            };
            self.outbox.broadcast(&StepMessage::Updates {
                worker: self.rank,
                step: tstep,
                updates: mine.clone(),
            });

            let mut all = mine;
            for updates in self.gather(tstep)? {
                all.extend(updates);
            }
            all.sort_by_key(|(i, _)| *i);

            // Every replica holds the same state, so a failure here is raised
            // by all workers at the same step.
            self.replica
                .apply_updates(tstep, &all, self.config)
                .map_err(|err| Failure::Own(err.into()))?;
            if self.rank == 0 {
                progress.step_done(tstep);
            }
        }
        Ok(())
    }

    /// Collect the step-`tstep` updates of every peer.
    fn gather(&mut self, tstep: usize) -> Result<Vec<Vec<(usize, DipoleUpdate)>>, Failure> {
        let mut pending: Vec<usize> = (0..self.workers).filter(|&w| w != self.rank).collect();
        let mut received = Vec::with_capacity(pending.len());
        for (worker, updates) in std::mem::take(&mut self.deferred) {
            pending.retain(|&w| w != worker);
            received.push(updates);
        }
        let mut early = Vec::new();
        while !pending.is_empty() {
            match self.inbox.recv() {
                Ok(StepMessage::Updates {
                    worker,
                    step,
                    updates,
                }) => {
                    if step == tstep {
                        pending.retain(|&w| w != worker);
                        received.push(updates);
                    } else {
                        early.push((worker, updates));
                    }
                }
                Ok(StepMessage::Abort { worker, error }) => {
                    return Err(Failure::Peer(match error {
                        Some(err) => err.into(),
                        None => ComputeError::WorkerDisconnected { worker },
                    }));
                }
                // Every peer hung up; blame the first one still owing this step.
                Err(_) => {
                    return Err(Failure::Peer(ComputeError::WorkerDisconnected {
                        worker: pending[0],
                    }));
                }
            }
        }
        self.deferred = early;
        Ok(received)
    }
}

/// Message-passing backend with a fixed worker count.
pub struct DistributedBackend {
    workers: usize,
}

impl DistributedBackend {
    pub fn new(workers: usize) -> Result<Self, ComputeError> {
        if workers == 0 {
            return Err(ComputeError::InvalidConfiguration(
                "the distributed backend needs at least one worker".into(),
            ));
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl ComputeBackend for DistributedBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("Distributed ({} workers)", self.workers),
            backend_type: BackendType::Distributed,
            compute_units: Some(self.workers),
        }
    }

    fn run(&self, sim: &mut Simulation, config: &RunConfig) -> Result<RunSummary, ComputeError> {
        if sim.begin_run(config)? {
            return Ok(RunSummary {
                steps: 0,
                restored: true,
            });
        }
        let steps = config.timesteps - 1;
        let workers = self.workers;
        log::info!(
            "Running {} dipoles for {} steps on {} workers",
            sim.dipole_count(),
            steps,
            workers
        );

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..workers).map(|_| channel()).unzip();
        let outcomes: Vec<(Simulation, Result<(), Failure>)> = thread::scope(|scope| {
            let handles: Vec<_> = receivers
                .into_iter()
                .enumerate()
                .map(|(rank, inbox)| {
                    let peers = senders
                        .iter()
                        .enumerate()
                        .filter(|(peer, _)| *peer != rank)
                        .map(|(_, tx)| tx.clone())
                        .collect();
                    let mut worker = Worker {
                        rank,
                        workers,
                        replica: sim.clone(),
                        inbox,
                        outbox: Outbox { rank, peers },
                        config,
                        deferred: Vec::new(),
                    };
                    scope.spawn(move || {
                        let result = worker.run(steps);
                        (worker.replica, result)
                    })
                })
                .collect();
            drop(senders);

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        (
                            Simulation::default(),
                            Err(Failure::Own(ComputeError::WorkerDisconnected { worker: rank })),
                        )
                    })
                })
                .collect()
        });

        let mut first_replica = None;
        let mut peer_failure = None;
        for (rank, (replica, result)) in outcomes.into_iter().enumerate() {
            match result {
                Ok(()) if rank == 0 => first_replica = Some(replica),
                Ok(()) => {}
                Err(Failure::Own(err)) => {
                    if !matches!(err, ComputeError::WorkerDisconnected { .. }) {
                        *sim = replica;
                    }
                    return Err(err);
                }
                Err(Failure::Peer(err)) => {
                    peer_failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = peer_failure {
            return Err(err);
        }
        *sim = first_replica.ok_or(ComputeError::WorkerDisconnected { worker: 0 })?;

        sim.finish_run(config)?;
        Ok(RunSummary {
            steps,
            restored: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lone_worker(rank: usize, workers: usize, config: &RunConfig) -> (Worker<'_>, Sender<StepMessage>) {
        let (tx, inbox) = channel();
        let worker = Worker {
            rank,
            workers,
            replica: Simulation::default(),
            inbox,
            outbox: Outbox {
                rank,
                peers: Vec::new(),
            },
            config,
            deferred: Vec::new(),
        };
        (worker, tx)
    }

    fn lost_peer(result: Result<Vec<Vec<(usize, DipoleUpdate)>>, Failure>) -> Option<usize> {
        match result {
            Err(Failure::Peer(ComputeError::WorkerDisconnected { worker })) => Some(worker),
            _ => None,
        }
    }

    #[test]
    fn test_hang_up_names_silent_peer() {
        let config = RunConfig::new(4, 1e-17);
        let (mut worker, tx) = lone_worker(1, 3, &config);
        tx.send(StepMessage::Updates {
            worker: 0,
            step: 0,
            updates: Vec::new(),
        })
        .unwrap();
        drop(tx);
        assert_eq!(lost_peer(worker.gather(0)), Some(2));
    }

    #[test]
    fn test_early_updates_count_for_next_step() {
        let config = RunConfig::new(4, 1e-17);
        let (mut worker, tx) = lone_worker(0, 3, &config);
        for (from, step) in [(1, 0), (1, 1), (2, 0)] {
            tx.send(StepMessage::Updates {
                worker: from,
                step,
                updates: Vec::new(),
            })
            .unwrap();
        }
        assert_eq!(worker.gather(0).ok().map(|r| r.len()), Some(2));
        drop(tx);
        // Worker 1 already delivered step 1, so worker 2 is the one missing.
        assert_eq!(lost_peer(worker.gather(1)), Some(2));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            DistributedBackend::new(0),
            Err(ComputeError::InvalidConfiguration(_))
        ));
    }
}
