//! Transaction control
//!
//! Autocommit is never used for graph mutations: the store opens with a
//! transaction already running, and after a commit or rollback the next
//! mutation begins a new one. Transactions do not nest.

use crate::connection::Sql;
use crate::error::GraphResult;
use crate::store::GraphStore;
use parking_lot::Mutex;
use tracing::{debug, error};

/// Whether a transaction is open on the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Inactive,
}

/// Tracks the connection's transaction and issues begin/commit/rollback
#[derive(Debug)]
pub struct TransactionController {
    state: Mutex<TxState>,
}

impl TransactionController {
    /// Begin the initial transaction and return a controller in `Active`
    pub fn start(sql: &Sql<'_>) -> GraphResult<Self> {
        sql.execute_batch("BEGIN TRANSACTION;")?;
        debug!("Initial transaction started");
        Ok(Self {
            state: Mutex::new(TxState::Active),
        })
    }

    pub fn state(&self) -> TxState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TxState::Active
    }

    /// Begin a transaction unless one is already open
    pub fn begin(&self, sql: &Sql<'_>) -> GraphResult<()> {
        let mut state = self.state.lock();
        if *state == TxState::Active {
            return Ok(());
        }

        sql.execute_batch("BEGIN TRANSACTION;")?;
        *state = TxState::Active;
        debug!("Transaction started");
        Ok(())
    }

    /// Commit; failures are logged, never retried
    pub fn success(&self, sql: &Sql<'_>) {
        let mut state = self.state.lock();
        match sql.execute_batch("COMMIT;") {
            Ok(()) => debug!("Transaction committed"),
            Err(e) => error!(error = %e, "Failed to commit"),
        }
        *state = TxState::Inactive;
    }

    /// Roll back; failures are logged, never retried
    pub fn failure(&self, sql: &Sql<'_>) {
        let mut state = self.state.lock();
        match sql.execute_batch("ROLLBACK;") {
            Ok(()) => debug!("Transaction rolled back"),
            Err(e) => error!(error = %e, "Failed to rollback"),
        }
        *state = TxState::Inactive;
    }
}

/// Transaction handle given to callers of [`GraphStore::begin_transaction`]
///
/// Dropping or closing the handle does nothing: the connection belongs to the
/// store, and ending a transaction always takes an explicit `success` or
/// `failure`.
pub struct Transaction<'g> {
    store: &'g GraphStore,
}

impl<'g> Transaction<'g> {
    pub(crate) fn new(store: &'g GraphStore) -> Self {
        Self { store }
    }

    /// Begin a new transaction if the previous one has ended
    pub fn begin(&self) -> GraphResult<()> {
        self.store.begin()
    }

    /// Commit everything written since the transaction began
    pub fn success(&self) {
        self.store.commit();
    }

    /// Discard everything written since the transaction began
    pub fn failure(&self) {
        self.store.rollback();
    }

    /// No-op; the store keeps its connection open
    pub fn close(self) {}

    pub fn is_active(&self) -> bool {
        self.store.transaction_state() == TxState::Active
    }
}
