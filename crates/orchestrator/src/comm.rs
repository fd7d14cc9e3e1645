//! Collective communication between ranks.
//!
//! Every collective is built on [`Communicator::all_gather`]: each rank
//! contributes one value and receives the values of all ranks in rank order.
//! Reductions fold the gathered values in that order, so every rank observes
//! bit-identical results.
//!
//! [`ThreadComm`] runs ranks as OS threads of one process; [`SingleRank`] is
//! the trivial one-rank case.

use std::any::{type_name, Any};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use kernel::{ConfigError, ForceError};
use thiserror::Error;

/// Transport-level failure of a collective operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    /// A rank contributed a value of a different type, i.e. the ranks are
    /// not executing the same collective.
    #[error("rank {rank} did not contribute a `{expected}` to the collective")]
    Mismatch {
        /// Offending rank.
        rank: usize,
        /// Type the caller expected.
        expected: &'static str,
    },
    /// The shared exchange buffer was poisoned by a panicking rank.
    #[error("exchange buffer poisoned")]
    Poisoned,
    /// Broadcast root outside the communicator.
    #[error("broadcast root {root} out of range for {size} ranks")]
    InvalidRoot {
        /// Requested root.
        root: usize,
        /// Communicator size.
        size: usize,
    },
    /// The broadcast root did not supply a value.
    #[error("broadcast root {0} supplied no value")]
    MissingRootValue(usize),
    /// A point-to-point exchange did not address every rank.
    #[error("exchange needs one outgoing buffer per rank, got {got} for {size} ranks")]
    ExchangeShape {
        /// Buffers supplied.
        got: usize,
        /// Communicator size.
        size: usize,
    },
    /// Element-wise reductions over vectors of different lengths.
    #[error("reduction over vectors of different lengths")]
    LengthMismatch,
    /// A rank thread panicked.
    #[error("rank {0} panicked")]
    RankPanicked(usize),
}

impl From<CommError> for ForceError {
    fn from(err: CommError) -> Self {
        ForceError::Collective(err.to_string())
    }
}

impl From<CommError> for ConfigError {
    fn from(err: CommError) -> Self {
        ConfigError::Broadcast(err.to_string())
    }
}

/// Collective transport seen by one rank.
///
/// All ranks must call the same collectives in the same order.
pub trait Communicator: Clone + Send + Sync {
    /// This rank's index.
    fn rank(&self) -> usize;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Gather one value from every rank, in rank order.
    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>, CommError>;

    /// Sum over all ranks.
    fn all_reduce_sum(&self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_gather(value)?.into_iter().sum())
    }

    /// Element-wise sum over all ranks.
    fn all_reduce_sum_vec(&self, values: Vec<f64>) -> Result<Vec<f64>, CommError> {
        let n = values.len();
        let gathered = self.all_gather(values)?;
        let mut total = vec![0.0; n];
        for contribution in gathered {
            if contribution.len() != n {
                return Err(CommError::LengthMismatch);
            }
            for (t, v) in total.iter_mut().zip(contribution) {
                *t += v;
            }
        }
        Ok(total)
    }

    /// Maximum over all ranks.
    fn all_reduce_max(&self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_gather(value)?.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }

    /// Maximum of a count over all ranks.
    fn all_reduce_max_usize(&self, value: usize) -> Result<usize, CommError> {
        Ok(self.all_gather(value)?.into_iter().max().unwrap_or(0))
    }

    /// `true` if any rank passes `true`.
    fn any(&self, flag: bool) -> Result<bool, CommError> {
        Ok(self.all_gather(flag)?.into_iter().any(|f| f))
    }

    /// Bitwise OR over all ranks.
    fn all_reduce_or(&self, bits: u32) -> Result<u32, CommError> {
        Ok(self.all_gather(bits)?.into_iter().fold(0, |acc, b| acc | b))
    }

    /// Distribute the root's value to every rank. Only the root's argument
    /// is read.
    fn broadcast<T: Clone + Send + 'static>(&self, root: usize, value: Option<T>) -> Result<T, CommError> {
        if root >= self.size() {
            return Err(CommError::InvalidRoot { root, size: self.size() });
        }
        let contribution = if self.rank() == root { value } else { None };
        self.all_gather(contribution)?
            .swap_remove(root)
            .ok_or(CommError::MissingRootValue(root))
    }

    /// Point-to-point exchange: `outgoing[r]` is sent to rank `r`; the result
    /// holds at index `s` what rank `s` sent to this rank.
    fn exchange<T: Clone + Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, CommError> {
        if outgoing.len() != self.size() {
            return Err(CommError::ExchangeShape { got: outgoing.len(), size: self.size() });
        }
        let rank = self.rank();
        self.all_gather(outgoing)?
            .into_iter()
            .map(|mut from_source| {
                if from_source.len() <= rank {
                    return Err(CommError::LengthMismatch);
                }
                Ok(from_source.swap_remove(rank))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Single rank
// ---------------------------------------------------------------------------

/// The one-rank communicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>, CommError> {
        Ok(vec![value])
    }
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

type Slot = Option<Box<dyn Any + Send>>;

struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

/// Communicator for ranks running as threads of one process.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm").field("rank", &self.rank).field("size", &self.size).finish()
    }
}

impl ThreadComm {
    /// Create the communicators of a group of `size` ranks, one per rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        (0..size)
            .map(|rank| ThreadComm { rank, size, shared: Arc::clone(&shared) })
            .collect()
    }

    fn read_all<T: Clone + 'static>(&self) -> Result<Vec<T>, CommError> {
        let slots = self.shared.slots.lock().map_err(|_| CommError::Poisoned)?;
        slots
            .iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.as_ref()
                    .and_then(|boxed| boxed.downcast_ref::<T>())
                    .cloned()
                    .ok_or(CommError::Mismatch { rank, expected: type_name::<T>() })
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>, CommError> {
        // Every rank passes both barriers, whatever happens in between, so a
        // local failure never leaves the other ranks waiting.
        let posted = match self.shared.slots.lock() {
            Ok(mut slots) => {
                slots[self.rank] = Some(Box::new(value));
                Ok(())
            }
            Err(_) => Err(CommError::Poisoned),
        };
        self.shared.barrier.wait();
        let gathered = posted.and_then(|()| self.read_all::<T>());
        self.shared.barrier.wait();
        gathered
    }
}

/// Run `f` on `size` thread ranks and collect the results in rank order.
pub fn run_ranks<F, R>(size: usize, f: F) -> Result<Vec<R>, CommError>
where
    F: Fn(ThreadComm) -> R + Sync,
    R: Send,
{
    let comms = ThreadComm::group(size);
    thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                thread::Builder::new()
                    .name(format!("rank-{}", comm.rank()))
                    .spawn_scoped(scope, move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle {
                Ok(handle) => handle.join().map_err(|_| CommError::RankPanicked(rank)),
                Err(_) => Err(CommError::RankPanicked(rank)),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rank_collectives_are_identity() {
        let comm = SingleRank;
        assert_eq!(comm.all_reduce_sum(2.5).unwrap(), 2.5);
        assert_eq!(comm.broadcast(0, Some(7)).unwrap(), 7);
        assert_eq!(comm.exchange(vec![vec![1, 2]]).unwrap(), vec![vec![1, 2]]);
        assert!(comm.broadcast::<i32>(1, Some(1)).is_err());
    }

    #[test]
    fn thread_ranks_gather_in_rank_order() {
        let results = run_ranks(3, |comm| comm.all_gather(comm.rank() * 10).unwrap()).unwrap();
        for gathered in results {
            assert_eq!(gathered, vec![0, 10, 20]);
        }
    }

    #[test]
    fn reductions_agree_on_every_rank() {
        let results = run_ranks(4, |comm| {
            let r = comm.rank() as f64;
            (
                comm.all_reduce_sum(r).unwrap(),
                comm.all_reduce_max(r).unwrap(),
                comm.any(comm.rank() == 2).unwrap(),
                comm.all_reduce_sum_vec(vec![1.0, r]).unwrap(),
            )
        })
        .unwrap();
        for (sum, max, any, vec) in results {
            assert_eq!(sum, 6.0);
            assert_eq!(max, 3.0);
            assert!(any);
            assert_eq!(vec, vec![4.0, 6.0]);
        }
    }

    #[test]
    fn broadcast_reads_only_the_root() {
        let results = run_ranks(3, |comm| {
            let mine = format!("from {}", comm.rank());
            comm.broadcast(1, Some(mine)).unwrap()
        })
        .unwrap();
        assert!(results.iter().all(|v| v == "from 1"));
    }

    #[test]
    fn exchange_routes_by_destination() {
        let results = run_ranks(3, |comm| {
            let outgoing = (0..comm.size()).map(|dest| vec![(comm.rank(), dest)]).collect();
            comm.exchange(outgoing).unwrap()
        })
        .unwrap();
        for (rank, incoming) in results.into_iter().enumerate() {
            for (source, items) in incoming.into_iter().enumerate() {
                assert_eq!(items, vec![(source, rank)]);
            }
        }
    }

    #[test]
    fn mismatched_collectives_are_reported_on_every_rank() {
        let results = run_ranks(2, |comm| {
            if comm.rank() == 0 {
                comm.all_gather(1.0_f64).map(|_| ())
            } else {
                comm.all_gather(1_u8).map(|_| ())
            }
        })
        .unwrap();
        assert!(results.iter().all(|r| matches!(r, Err(CommError::Mismatch { .. }))));
    }
}
