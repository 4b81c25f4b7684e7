// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded pool of read-only connections (spec §5's resource-limits note:
//! "open file handles are bounded by the store's pool, a small multiple
//! of expected concurrency").

use crate::StoreError;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tokio::sync::{Mutex, Semaphore};

pub(crate) struct ReadPool {
    conns: Mutex<Vec<Connection>>,
    permits: Semaphore,
}

impl ReadPool {
    pub(crate) async fn open(path: &Path, size: usize) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let conns = tokio::task::spawn_blocking(move || -> Result<Vec<Connection>, StoreError> {
            let mut conns = Vec::with_capacity(size);
            for _ in 0..size {
                let conn = Connection::open_with_flags(
                    &path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
                )?;
                conns.push(conn);
            }
            Ok(conns)
        })
        .await
        .expect("read pool open task panicked")?;

        Ok(Self {
            conns: Mutex::new(conns),
            permits: Semaphore::new(size),
        })
    }

    /// Run `f` against a pooled connection on a blocking-pool thread,
    /// then return the connection to the pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("read pool semaphore closed");
        let conn = {
            let mut guard = self.conns.lock().await;
            guard.pop().expect("pool size matches semaphore permits")
        };

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await
        .expect("read worker panicked");

        self.conns.lock().await.push(conn);
        result
    }
}
