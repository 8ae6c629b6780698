//! Runs a [`Packager`] on a dedicated blocking worker fed through a bounded
//! channel.
//!
//! The packager performs blocking file I/O and no locking of its own. The
//! worker serializes every batch and control request, and the bounded channel
//! applies backpressure to producers when writes fall behind.

use livedash_common::{Error, Frame, Result, TrackId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::control::{ControlRequest, ControlResponse};
use crate::packager::Packager;

enum Command {
    Frames(Vec<(TrackId, Frame)>),
    Control(ControlRequest, oneshot::Sender<Result<ControlResponse>>),
    Finish(oneshot::Sender<Result<()>>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Frames(frames) => write!(f, "Frames({})", frames.len()),
            Command::Control(request, _) => write!(f, "Control({:?})", request),
            Command::Finish(_) => write!(f, "Finish"),
        }
    }
}

/// Cloneable handle to a packager worker.
#[derive(Debug, Clone)]
pub struct PackagerHandle {
    tx: mpsc::Sender<Command>,
}

/// Move `packager` onto a blocking worker.
///
/// The worker stops once every handle is dropped and returns the packager.
pub fn spawn(packager: Packager, capacity: usize) -> (PackagerHandle, JoinHandle<Packager>) {
    let (tx, mut rx) = mpsc::channel::<Command>(capacity.max(1));

    let join = tokio::task::spawn_blocking(move || {
        let mut packager = packager;
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Frames(frames) => {
                    if let Err(e) = packager.process_frames(&frames) {
                        tracing::warn!(error = %e, frames = frames.len(), "Dropping frame batch");
                    }
                }
                Command::Control(request, reply) => {
                    let _ = reply.send(packager.apply(request));
                }
                Command::Finish(reply) => {
                    let _ = reply.send(packager.finish());
                }
            }
        }
        tracing::debug!("Packager worker stopped");
        packager
    });

    (PackagerHandle { tx }, join)
}

impl PackagerHandle {
    /// Queue a batch of frames. Waits while the queue is full.
    pub async fn send_frames(&self, frames: Vec<(TrackId, Frame)>) -> Result<()> {
        self.tx
            .send(Command::Frames(frames))
            .await
            .map_err(|_| worker_stopped())
    }

    /// Apply a control request between batches.
    pub async fn control(&self, request: ControlRequest) -> Result<ControlResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Control(request, reply))
            .await
            .map_err(|_| worker_stopped())?;
        rx.await.map_err(|_| worker_stopped())?
    }

    /// Flush everything still buffered.
    pub async fn finish(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Finish(reply))
            .await
            .map_err(|_| worker_stopped())?;
        rx.await.map_err(|_| worker_stopped())?
    }
}

fn worker_stopped() -> Error {
    Error::internal("packager worker stopped")
}
