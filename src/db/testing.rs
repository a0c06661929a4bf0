//! Scripted in-memory backend for unit tests.
//!
//! Every statement is recorded with the session that ran it. Replies are
//! queued up front and consumed in order by every statement; with
//! the queue empty a fetch returns no rows and an execute affects nothing.

use super::backend::{Connect, Session};
use super::connector::Connector;
use super::facade::Db;
use super::query::Statement;
use super::value::{Row, SqlValue};
use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Queued backend reply.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(String),
}

/// Session method that ran a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    FetchAll,
    FetchOptional,
    Execute,
}

/// A statement as the backend received it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Executed {
    pub session: usize,
    pub call: Call,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Default)]
struct Shared {
    next_id: AtomicUsize,
    connects: AtomicUsize,
    fail_connects: AtomicBool,
    sessions: Mutex<HashMap<usize, Arc<AtomicBool>>>,
    severed: Mutex<HashMap<usize, Arc<AtomicBool>>>,
    replies: Mutex<VecDeque<Reply>>,
    log: Mutex<Vec<Executed>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    shared: Arc<Shared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.shared.replies.lock().push_back(Reply::Rows(rows));
    }

    pub fn push_affected(&self, count: u64) {
        self.shared.replies.lock().push_back(Reply::Affected(count));
    }

    pub fn push_failure(&self, message: &str) {
        self.shared
            .replies
            .lock()
            .push_back(Reply::Fail(message.to_string()));
    }

    pub fn fail_connects(&self, fail: bool) {
        self.shared.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Marks a session closed as if the server dropped it.
    pub fn drop_session(&self, id: usize) {
        if let Some(flag) = self.shared.sessions.lock().get(&id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Drops a session server-side without the client noticing; the flag
    /// only flips when the next statement fails.
    pub fn sever_session(&self, id: usize) {
        if let Some(flag) = self.shared.severed.lock().get(&id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.shared.log.lock().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.shared
            .log
            .lock()
            .iter()
            .map(|entry| entry.sql.clone())
            .collect()
    }

    fn next_reply(&self) -> Option<Reply> {
        self.shared.replies.lock().pop_front()
    }

    fn record(&self, session: usize, call: Call, statement: &Statement) {
        self.shared.log.lock().push(Executed {
            session,
            call,
            sql: statement.sql().to_string(),
            params: statement.params().to_vec(),
        });
    }
}

impl Connect for MockBackend {
    type Connection = MockSession;

    async fn connect(&self) -> DbResult<MockSession> {
        if self.shared.fail_connects.load(Ordering::SeqCst) {
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
            return Err(sqlx::Error::Io(refused).into());
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        let severed = Arc::new(AtomicBool::new(false));
        self.shared.sessions.lock().insert(id, Arc::clone(&closed));
        self.shared.severed.lock().insert(id, Arc::clone(&severed));
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            id,
            closed,
            severed,
            backend: self.clone(),
        })
    }
}

pub(crate) struct MockSession {
    id: usize,
    closed: Arc<AtomicBool>,
    severed: Arc<AtomicBool>,
    backend: MockBackend,
}

impl MockSession {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.severed.load(Ordering::SeqCst) {
            self.kill();
        }
        if self.is_closed() {
            let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "session closed");
            return Err(sqlx::Error::Io(broken).into());
        }
        Ok(())
    }
}

impl MockSession {
    fn rows(&self) -> DbResult<Vec<Row>> {
        match self.backend.next_reply() {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(DbError::Backend(sqlx::Error::Protocol(message))),
            Some(Reply::Affected(_)) | None => Ok(Vec::new()),
        }
    }
}

impl Session for MockSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn fetch_all(&mut self, statement: &Statement) -> DbResult<Vec<Row>> {
        self.ensure_open()?;
        self.backend.record(self.id, Call::FetchAll, statement);
        self.rows()
    }

    async fn fetch_optional(&mut self, statement: &Statement) -> DbResult<Option<Row>> {
        self.ensure_open()?;
        self.backend.record(self.id, Call::FetchOptional, statement);
        Ok(self.rows()?.into_iter().next())
    }

    async fn execute(&mut self, statement: &Statement) -> DbResult<u64> {
        self.ensure_open()?;
        self.backend.record(self.id, Call::Execute, statement);
        match self.backend.next_reply() {
            Some(Reply::Affected(count)) => Ok(count),
            Some(Reply::Rows(rows)) => Ok(rows.len() as u64),
            Some(Reply::Fail(message)) => Err(DbError::Backend(sqlx::Error::Protocol(message))),
            None => Ok(0),
        }
    }

    async fn close(self) -> DbResult<()> {
        self.kill();
        Ok(())
    }
}

pub(crate) async fn mock_connector(
    backend: &MockBackend,
    min_size: u32,
    max_size: u32,
) -> Connector<MockBackend> {
    let config = DatabaseConfig::new("postgres://mock/accounts").with_pool_size(min_size, max_size);
    Connector::with_backend(backend.clone(), config)
        .await
        .expect("mock connector should initialize")
}

pub(crate) async fn mock_db(backend: &MockBackend) -> Db<MockBackend> {
    Db::new(Arc::new(mock_connector(backend, 1, 2).await))
}
