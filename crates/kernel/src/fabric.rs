//! Worker topology and blocking collective exchange.
//!
//! Workers run as one thread each and communicate through per-worker channels.
//! The API is deliberately shaped like message passing between ranks so that a
//! network transport can replace the channel transport as a drop-in later.
//!
//! Every collective is a synchronization point: each participating worker
//! sends exactly one payload to every peer in the group and blocks until it
//! has received one payload from each of them. Packets carry a sequence
//! number (one per collective, advanced identically on every worker) and the
//! source rank, so the result of an exchange is a pure function of indices
//! and shapes, never of message arrival order.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use rustfft::num_complex::Complex;

use crate::error::{MeshError, MeshResult};
use crate::grid::{ProcessorGrid, WorkerCoord};

/// How long a worker waits inside a collective before declaring the run dead.
/// An exchange either completes for everyone or the run is aborted; the
/// timeout only exists to surface a crashed peer as an error instead of a
/// silent hang.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(120);

/// One mass contribution routed to the worker owning the destination cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deposit {
    /// Flat global index `(((b * nx + x) * ny + y) * nz + z)` on the output mesh.
    pub cell: u64,
    /// Mass to accumulate into the cell.
    pub value: f32,
}

/// Payload of one exchanged packet.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A packed block of complex field data (FFT transposes).
    Complex(Vec<Complex<f32>>),
    /// Out-of-partition mesh contributions (painter halo exchange).
    Deposits(Vec<Deposit>),
}

struct Packet {
    seq: u64,
    src: usize,
    body: Payload,
}

/// Builds the channel transport for one run's worth of workers.
pub struct Fabric;

impl Fabric {
    /// Create one connected [`FabricHandle`] per worker of `grid`.
    ///
    /// Handles are handed to worker threads in rank order; the fabric itself
    /// keeps no state once built.
    pub fn build(grid: ProcessorGrid) -> Vec<FabricHandle> {
        let n = grid.num_workers();
        let mut senders = Vec::with_capacity(n);
        let mut receivers = Vec::with_capacity(n);
        for _ in 0..n {
            let (tx, rx) = channel::<Packet>();
            senders.push(tx);
            receivers.push(rx);
        }
        receivers
            .into_iter()
            .enumerate()
            .map(|(id, receiver)| FabricHandle {
                id,
                coord: grid.coordinate_of(id),
                grid,
                senders: senders.clone(),
                receiver,
                seq: 0,
                stash: Vec::new(),
            })
            .collect()
    }
}

/// One worker's endpoint into the fabric.
pub struct FabricHandle {
    id: usize,
    coord: WorkerCoord,
    grid: ProcessorGrid,
    senders: Vec<Sender<Packet>>,
    receiver: Receiver<Packet>,
    seq: u64,
    /// Packets for collectives this worker has not entered yet. A fast peer
    /// may already be one collective ahead.
    stash: Vec<Packet>,
}

impl FabricHandle {
    /// This worker's rank (row-major).
    pub fn id(&self) -> usize {
        self.id
    }

    /// This worker's coordinate on the processor grid.
    pub fn coord(&self) -> WorkerCoord {
        self.coord
    }

    /// The processor grid this fabric spans.
    pub fn grid(&self) -> ProcessorGrid {
        self.grid
    }

    /// All-to-all within this worker's row (the "cols" axis group).
    ///
    /// `outgoing[c]` is delivered to the worker at column `c` of this row;
    /// the returned vector holds one payload per column, in column order.
    pub fn all_to_all_cols(&mut self, outgoing: Vec<Payload>) -> MeshResult<Vec<Payload>> {
        let row = self.coord.row;
        let peers: Vec<usize> = (0..self.grid.cols)
            .map(|col| self.grid.id_of(WorkerCoord { row, col }))
            .collect();
        self.exchange(&peers, outgoing)
    }

    /// All-to-all within this worker's column (the "rows" axis group).
    ///
    /// `outgoing[r]` is delivered to the worker at row `r` of this column;
    /// the returned vector holds one payload per row, in row order.
    pub fn all_to_all_rows(&mut self, outgoing: Vec<Payload>) -> MeshResult<Vec<Payload>> {
        let col = self.coord.col;
        let peers: Vec<usize> = (0..self.grid.rows)
            .map(|row| self.grid.id_of(WorkerCoord { row, col }))
            .collect();
        self.exchange(&peers, outgoing)
    }

    /// All-to-all over the whole processor grid, in rank order.
    ///
    /// Used by the painter to route boundary-crossing contributions to their
    /// owning worker; payloads are expected to be small (boundary-only).
    pub fn all_to_all(&mut self, outgoing: Vec<Payload>) -> MeshResult<Vec<Payload>> {
        let peers: Vec<usize> = (0..self.grid.num_workers()).collect();
        self.exchange(&peers, outgoing)
    }

    fn exchange(&mut self, peers: &[usize], outgoing: Vec<Payload>) -> MeshResult<Vec<Payload>> {
        assert_eq!(
            peers.len(),
            outgoing.len(),
            "one outgoing payload per group member"
        );
        self.seq += 1;
        let seq = self.seq;

        let mut incoming: Vec<Option<Payload>> = peers.iter().map(|_| None).collect();
        let mut slot_of: HashMap<usize, usize> = HashMap::with_capacity(peers.len());
        for (slot, &peer) in peers.iter().enumerate() {
            slot_of.insert(peer, slot);
        }

        for (&peer, body) in peers.iter().zip(outgoing) {
            if peer == self.id {
                incoming[slot_of[&peer]] = Some(body);
                continue;
            }
            self.senders[peer]
                .send(Packet { seq, src: self.id, body })
                .map_err(|_| {
                    MeshError::Communication(format!(
                        "worker {} dropped out of collective {}",
                        peer, seq
                    ))
                })?;
        }

        let mut missing = peers.len() - 1;
        // Drain packets stashed by an earlier collective first.
        let mut i = 0;
        while i < self.stash.len() {
            if self.stash[i].seq == seq {
                let packet = self.stash.swap_remove(i);
                Self::place(&slot_of, &mut incoming, packet, seq)?;
                missing -= 1;
            } else {
                i += 1;
            }
        }

        while missing > 0 {
            let packet = match self.receiver.recv_timeout(EXCHANGE_TIMEOUT) {
                Ok(p) => p,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(MeshError::Communication(format!(
                        "collective {} timed out on worker {} after {:?} \
                         ({} of {} payloads missing); a peer likely failed",
                        seq,
                        self.id,
                        EXCHANGE_TIMEOUT,
                        missing,
                        peers.len() - 1
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MeshError::Communication(format!(
                        "fabric torn down while worker {} waited in collective {}",
                        self.id, seq
                    )));
                }
            };
            if packet.seq > seq {
                self.stash.push(packet);
                continue;
            }
            Self::place(&slot_of, &mut incoming, packet, seq)?;
            missing -= 1;
        }

        tracing::trace!(
            worker = self.id,
            seq,
            group = peers.len(),
            "collective exchange complete"
        );
        Ok(incoming.into_iter().map(|p| p.unwrap()).collect())
    }

    fn place(
        slot_of: &HashMap<usize, usize>,
        incoming: &mut [Option<Payload>],
        packet: Packet,
        seq: u64,
    ) -> MeshResult<()> {
        if packet.seq != seq {
            return Err(MeshError::Communication(format!(
                "stale packet from worker {} (collective {}, expected {})",
                packet.src, packet.seq, seq
            )));
        }
        let slot = *slot_of.get(&packet.src).ok_or_else(|| {
            MeshError::Communication(format!(
                "worker {} is not a member of collective {}",
                packet.src, seq
            ))
        })?;
        if incoming[slot].replace(packet.body).is_some() {
            return Err(MeshError::Communication(format!(
                "duplicate payload from worker {} in collective {}",
                packet.src, seq
            )));
        }
        Ok(())
    }
}
