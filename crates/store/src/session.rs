use config::StoreConfig;
use field::Snapshot;
use std::fmt;
use tracing::{debug, error, info};

use crate::backend::{Backend, IoStats, Mode};
use crate::descriptor::RunDescriptor;
use crate::error::{Location, StoreError};
use crate::build_backend;

/// Lifecycle of a [`CheckpointSession`].
///
/// ```text
/// Uninitialized -> Writing -> CompleteForward -> Reading -> Complete
///        \            \             \              \
///         +------------+-------------+--------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Writing,
    CompleteForward,
    Reading,
    Complete,
    /// Terminal. Recovery is a new session and a new forward pass.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Writing => "Writing",
            SessionState::CompleteForward => "CompleteForward",
            SessionState::Reading => "Reading",
            SessionState::Complete => "Complete",
            SessionState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// The run-scoped object a solver drives.
///
/// The forward pass writes indices `0, 1, ..., nt-1` in that order; the
/// adjoint pass reads `nt-1, ..., 1, 0`. Each call is checked against the
/// session state and the expected next index. Any violation and any backend
/// error moves the session to [`SessionState::Failed`], after which every
/// call returns [`StoreError::Order`]. A `Complete` session rejects further
/// calls the same way but stays `Complete`.
pub struct CheckpointSession {
    backend: Box<dyn Backend>,
    state: SessionState,
    /// Indices written so far; also the next index to write.
    written: u64,
    /// Indices read so far; the next index to read is `nt - 1 - read`.
    read: u64,
    /// State the session was in when it failed.
    failed_in: Option<SessionState>,
}

impl fmt::Debug for CheckpointSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointSession")
            .field("state", &self.state)
            .field("kind", &self.backend.descriptor().kind)
            .field("nt", &self.nt())
            .field("written", &self.written)
            .field("read", &self.read)
            .finish()
    }
}

impl CheckpointSession {
    /// Builds the backend `config` selects for `descriptor`.
    pub fn new(config: &StoreConfig, descriptor: RunDescriptor) -> Result<Self, StoreError> {
        Ok(Self::with_backend(build_backend(config, descriptor)?))
    }

    /// Wraps an already constructed backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            state: SessionState::Uninitialized,
            written: 0,
            read: 0,
            failed_in: None,
        }
    }

    /// Opens, for the adjoint pass, a store written by an earlier process.
    ///
    /// The session starts in [`SessionState::Reading`]. The memory backend
    /// has nothing to attach to; every read then fails with
    /// [`StoreError::MissingSnapshot`].
    pub fn attach_for_read(
        config: &StoreConfig,
        descriptor: RunDescriptor,
    ) -> Result<Self, StoreError> {
        let mut session = Self::new(config, descriptor)?;
        session.state = SessionState::CompleteForward;
        session.written = session.nt();
        session.open_for_read()?;
        Ok(session)
    }

    /// `Uninitialized -> Writing`
    pub fn open_for_write(&mut self) -> Result<(), StoreError> {
        self.expect_state("open_for_write", SessionState::Uninitialized)?;
        let res = self.backend.open(Mode::Write);
        self.guard(res)?;
        self.state = SessionState::Writing;
        debug!(nt = self.nt(), kind = %self.backend.descriptor().kind, "forward pass started");
        Ok(())
    }

    /// Stores the snapshot of timestep `index`, which must be the next one.
    ///
    /// An index written before is a [`StoreError::Concurrency`]; any other
    /// skip is a [`StoreError::Order`].
    pub fn write(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.expect_state("write", SessionState::Writing)?;
        if index < self.written {
            return self.fail(StoreError::Concurrency {
                at: Location::index(index),
            });
        }
        if index != self.written {
            let expected = self.written;
            return self.fail(StoreError::Order {
                operation: "write",
                expected: format!("index {}", expected),
                actual: format!("index {}", index),
            });
        }
        let res = self.backend.write_snapshot(index, snapshot);
        self.guard(res)?;
        self.written += 1;
        Ok(())
    }

    /// `Writing -> CompleteForward` once all `nt` snapshots are stored.
    pub fn finalize_forward(&mut self) -> Result<(), StoreError> {
        self.expect_state("finalize_forward", SessionState::Writing)?;
        if self.written != self.nt() {
            let (done, nt) = (self.written, self.nt());
            return self.fail(StoreError::IncompleteRun {
                phase: "forward pass",
                done,
                nt,
            });
        }
        let res = self.backend.close();
        self.guard(res)?;
        self.state = SessionState::CompleteForward;
        info!(nt = self.nt(), "forward pass complete");
        Ok(())
    }

    /// `CompleteForward -> Reading`, against the storage just written.
    pub fn open_for_read(&mut self) -> Result<(), StoreError> {
        self.expect_state("open_for_read", SessionState::CompleteForward)?;
        let res = self.backend.open(Mode::Read);
        self.guard(res)?;
        self.state = SessionState::Reading;
        debug!(nt = self.nt(), "adjoint pass started");
        Ok(())
    }

    /// Returns the snapshot of timestep `index`, which must be the one
    /// before the previously read index (starting at `nt - 1`).
    pub fn read(&mut self, index: u64) -> Result<Snapshot, StoreError> {
        self.expect_state("read", SessionState::Reading)?;
        let Some(expected) = self.next_read() else {
            return self.fail(StoreError::Order {
                operation: "read",
                expected: "no further reads".into(),
                actual: format!("index {}", index),
            });
        };
        if index != expected {
            return self.fail(StoreError::Order {
                operation: "read",
                expected: format!("index {}", expected),
                actual: format!("index {}", index),
            });
        }
        let res = self.backend.read_snapshot(index);
        let snapshot = self.guard(res)?;
        self.read += 1;
        Ok(snapshot)
    }

    /// `Reading -> Complete` once all `nt` snapshots were read.
    pub fn finalize_read(&mut self) -> Result<(), StoreError> {
        self.expect_state("finalize_read", SessionState::Reading)?;
        if self.read != self.nt() {
            let (done, nt) = (self.read, self.nt());
            return self.fail(StoreError::IncompleteRun {
                phase: "adjoint pass",
                done,
                nt,
            });
        }
        let res = self.backend.close();
        self.guard(res)?;
        self.state = SessionState::Complete;
        info!(nt = self.nt(), "adjoint pass complete");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn descriptor(&self) -> &RunDescriptor {
        self.backend.descriptor()
    }

    #[must_use]
    pub fn nt(&self) -> u64 {
        self.backend.descriptor().nt
    }

    /// Next index the adjoint pass must read, `None` when all were read.
    #[must_use]
    pub fn next_read(&self) -> Option<u64> {
        (self.read < self.nt()).then(|| self.nt() - 1 - self.read)
    }

    #[must_use]
    pub fn stats(&self) -> IoStats {
        self.backend.stats()
    }

    fn expect_state(
        &mut self,
        operation: &'static str,
        wanted: SessionState,
    ) -> Result<(), StoreError> {
        if self.state == wanted {
            return Ok(());
        }
        let actual = match (self.state, self.failed_in) {
            (SessionState::Failed, Some(prev)) => format!("session Failed (in {})", prev),
            (state, _) => format!("session {}", state),
        };
        self.fail(StoreError::Order {
            operation,
            expected: format!("session {}", wanted),
            actual,
        })
    }

    fn guard<T>(&mut self, res: Result<T, StoreError>) -> Result<T, StoreError> {
        match res {
            Ok(v) => Ok(v),
            Err(e) => self.fail(e),
        }
    }

    /// Moves a live session to `Failed`; terminal states stay put.
    fn fail<T>(&mut self, err: StoreError) -> Result<T, StoreError> {
        if !matches!(self.state, SessionState::Failed | SessionState::Complete) {
            error!(state = %self.state, error = %err, "checkpoint session failed");
            self.failed_in = Some(self.state);
            self.state = SessionState::Failed;
        }
        Err(err)
    }
}
