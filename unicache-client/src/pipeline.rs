//! # Pipeline
//!
//! Purpose: Queue several commands on one pooled connection and flush them
//! together, for compound operations the server has no single command for.
//!
//! ## Guarantees
//! - Commands are written back-to-back on the same socket, in queue order,
//!   so no other caller's commands interleave on that connection.
//! - This is **not** a transaction: other clients may observe the state
//!   between two queued commands, and a failure of one command does not undo
//!   the others.
//!
//! ## Resource Handling
//! The pipeline owns its `PooledConnection`. Dropping it without `sync`
//! still flushes whatever was queued, then the connection goes back to the
//! pool through its own drop guard.

use tracing::warn;

use crate::cmd::Cmd;
use crate::error::{ClientError, ClientResult};
use crate::pool::PooledConnection;
use crate::resp::RespValue;

/// A batch of commands bound to one connection.
pub struct Pipeline {
    conn: PooledConnection,
    queued: Vec<Cmd>,
}

impl Pipeline {
    pub(crate) fn new(conn: PooledConnection) -> Self {
        Pipeline {
            conn,
            queued: Vec::with_capacity(4),
        }
    }

    /// Queues a command. Nothing is sent until `sync` or drop.
    pub fn add(&mut self, cmd: Cmd) -> &mut Self {
        self.queued.push(cmd);
        self
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Flushes every queued command and returns the raw replies in order.
    pub fn sync(mut self) -> ClientResult<Vec<RespValue>> {
        let cmds = std::mem::take(&mut self.queued);
        self.conn.exec_batch(&cmds)
    }

    /// Like `sync`, but fails on the first error reply.
    pub fn sync_checked(self) -> ClientResult<Vec<RespValue>> {
        self.sync()?
            .into_iter()
            .map(RespValue::into_result)
            .collect::<Result<Vec<_>, ClientError>>()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.queued.is_empty() {
            return;
        }
        let cmds = std::mem::take(&mut self.queued);
        if let Err(err) = self.conn.exec_batch(&cmds) {
            warn!(addr = %self.conn.addr(), pending = cmds.len(), error = %err, "pipeline flush on drop failed");
        }
    }
}
