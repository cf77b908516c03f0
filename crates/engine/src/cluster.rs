//! Process group abstraction: rank and world size, blocking tagged
//! point-to-point exchange and the collectives the engine needs.
//!
//! Process launch and cluster bring-up are out of scope. The engine is
//! handed a pre-initialized [`ProcessGroup`]; [`SingleProcess`] covers the
//! common one-process deployment and [`LocalCluster`] provides an in-process
//! mesh used by tests and embedders that want several ranks inside one OS
//! process.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::wire::Wire;
use crate::Error;

pub(crate) const TAG_REDUCE: u64 = u64::MAX;
pub(crate) const TAG_GATHER: u64 = u64::MAX - 1;
pub(crate) const TAG_SCATTER: u64 = u64::MAX - 2;

#[derive(Clone, Copy, Debug)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    fn combine_u64(self, a: u64, b: u64) -> u64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }

    fn combine_f64(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }
}

/// The communication contract the engine runs against.
///
/// Point-to-point messages are delivered in send order within a
/// `(sender, receiver)` pair; no ordering is assumed across pairs. All
/// operations are blocking and any failure is fatal for the job — the
/// engine never retries.
pub trait ProcessGroup: Send + Sync {
    /// The id of the partition owned by this process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes (and therefore partitions) in the group.
    fn size(&self) -> usize;

    fn barrier(&self) -> Result<(), Error>;

    fn all_reduce_u64(&self, value: u64, op: ReduceOp) -> Result<u64, Error>;

    fn all_reduce_f64(&self, value: f64, op: ReduceOp) -> Result<f64, Error>;

    fn send(&self, to: usize, tag: u64, bytes: &[u8]) -> Result<(), Error>;

    fn recv(&self, from: usize, tag: u64) -> Result<Vec<u8>, Error>;
}

/// The trivial group: one rank that owns the whole vertex id space.
///
/// The engine short-circuits all self-directed traffic, so the
/// point-to-point operations of this group are never reached.
pub struct SingleProcess;

impl SingleProcess {
    pub fn shared() -> Arc<dyn ProcessGroup> {
        Arc::new(SingleProcess)
    }
}

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), Error> {
        Ok(())
    }

    fn all_reduce_u64(&self, value: u64, _op: ReduceOp) -> Result<u64, Error> {
        Ok(value)
    }

    fn all_reduce_f64(&self, value: f64, _op: ReduceOp) -> Result<f64, Error> {
        Ok(value)
    }

    fn send(&self, _to: usize, _tag: u64, _bytes: &[u8]) -> Result<(), Error> {
        Err(Error::Communication(
            "single-process group has no peers".into(),
        ))
    }

    fn recv(&self, _from: usize, _tag: u64) -> Result<Vec<u8>, Error> {
        Err(Error::Communication(
            "single-process group has no peers".into(),
        ))
    }
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<(u64, Vec<u8>)>>,
    ready: Condvar,
}

/// An in-process mesh of ranks connected through per-pair mailboxes.
///
/// Every rank runs on its own thread; sends never block, receives park on a
/// condvar until the matching mailbox has data. Collectives fan in to rank 0
/// and back out over the same mailboxes.
pub struct LocalCluster {
    size: usize,
    mailboxes: Vec<Mailbox>,
}

impl LocalCluster {
    /// Creates the mesh and returns one handle per rank.
    pub fn connect(size: usize) -> Vec<LocalProcess> {
        assert!(size > 0, "process group must have at least one rank");

        let mailboxes = (0..size * size).map(|_| Mailbox::default()).collect();
        let cluster = Arc::new(LocalCluster { size, mailboxes });

        (0..size)
            .map(|rank| LocalProcess {
                rank,
                cluster: Arc::clone(&cluster),
            })
            .collect()
    }

    /// Runs `f` once per rank, each on its own thread, and returns the
    /// per-rank results in rank order.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalProcess) -> R + Sync,
        R: Send,
    {
        let processes = Self::connect(size);

        std::thread::scope(|s| {
            let handles = processes
                .into_iter()
                .map(|process| {
                    let f = &f;
                    s.spawn(move || f(process))
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    fn mailbox(&self, from: usize, to: usize) -> &Mailbox {
        &self.mailboxes[from * self.size + to]
    }
}

/// One rank of a [`LocalCluster`].
pub struct LocalProcess {
    rank: usize,
    cluster: Arc<LocalCluster>,
}

impl LocalProcess {
    fn reduce<T, C, E, D>(&self, value: T, combine: C, enc: E, dec: D) -> Result<T, Error>
    where
        T: Copy,
        C: Fn(T, T) -> T,
        E: Fn(T) -> Vec<u8>,
        D: Fn(&[u8]) -> T,
    {
        if self.size() == 1 {
            return Ok(value);
        }

        if self.rank == 0 {
            let mut acc = value;
            for from in 1..self.size() {
                let bytes = self.recv(from, TAG_REDUCE)?;
                acc = combine(acc, dec(&bytes));
            }
            let bytes = enc(acc);
            for to in 1..self.size() {
                self.send(to, TAG_REDUCE, &bytes)?;
            }
            Ok(acc)
        } else {
            self.send(0, TAG_REDUCE, &enc(value))?;
            let bytes = self.recv(0, TAG_REDUCE)?;
            Ok(dec(&bytes))
        }
    }
}

impl ProcessGroup for LocalProcess {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.cluster.size
    }

    fn barrier(&self) -> Result<(), Error> {
        self.all_reduce_u64(0, ReduceOp::Sum).map(|_| ())
    }

    fn all_reduce_u64(&self, value: u64, op: ReduceOp) -> Result<u64, Error> {
        self.reduce(
            value,
            |a, b| op.combine_u64(a, b),
            |v| v.to_le_bytes().to_vec(),
            u64::decode,
        )
    }

    fn all_reduce_f64(&self, value: f64, op: ReduceOp) -> Result<f64, Error> {
        self.reduce(
            value,
            |a, b| op.combine_f64(a, b),
            |v| v.to_le_bytes().to_vec(),
            f64::decode,
        )
    }

    fn send(&self, to: usize, tag: u64, bytes: &[u8]) -> Result<(), Error> {
        if to >= self.size() {
            return Err(Error::Communication(format!(
                "send to rank {to} in a group of {}",
                self.size()
            )));
        }

        let mailbox = self.cluster.mailbox(self.rank, to);
        mailbox.queue.lock().push_back((tag, bytes.to_vec()));
        mailbox.ready.notify_one();
        Ok(())
    }

    fn recv(&self, from: usize, tag: u64) -> Result<Vec<u8>, Error> {
        if from >= self.size() {
            return Err(Error::Communication(format!(
                "recv from rank {from} in a group of {}",
                self.size()
            )));
        }

        let mailbox = self.cluster.mailbox(from, self.rank);
        let mut queue = mailbox.queue.lock();
        while queue.is_empty() {
            mailbox.ready.wait(&mut queue);
        }

        let (actual, bytes) = queue.pop_front().unwrap();
        if actual != tag {
            return Err(Error::Communication(format!(
                "rank {} expected tag {tag} from rank {from}, got {actual}",
                self.rank
            )));
        }
        Ok(bytes)
    }
}
