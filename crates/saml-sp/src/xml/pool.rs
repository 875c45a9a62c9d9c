//! Bounded parser pool.

use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex};

use super::parser::XmlParser;

/// Pool of [`XmlParser`]s shared by request-handling threads.
///
/// Parsers are created lazily up to `capacity`. When all of them are checked
/// out, [`ParserPool::checkout`] blocks until one is returned.
#[derive(Debug)]
pub struct ParserPool {
    capacity: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<XmlParser>,
    created: usize,
}

impl ParserPool {
    /// Creates a pool holding at most `capacity` parsers (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
        }
    }

    /// Maximum number of parsers.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of parsers currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        let state = self.state.lock();
        state.created - state.idle.len()
    }

    /// Borrows a parser, blocking while the pool is exhausted.
    pub fn checkout(&self) -> PooledParser<'_> {
        let mut state = self.state.lock();
        loop {
            if let Some(parser) = state.idle.pop() {
                return PooledParser::new(self, parser);
            }
            if state.created < self.capacity {
                state.created += 1;
                return PooledParser::new(self, XmlParser::new());
            }
            tracing::trace!(capacity = self.capacity, "parser pool exhausted, waiting");
            self.returned.wait(&mut state);
        }
    }

    fn give_back(&self, parser: XmlParser) {
        self.state.lock().idle.push(parser);
        self.returned.notify_one();
    }
}

/// A parser on loan from a [`ParserPool`]; returned when dropped.
#[derive(Debug)]
pub struct PooledParser<'a> {
    pool: &'a ParserPool,
    parser: Option<XmlParser>,
}

impl<'a> PooledParser<'a> {
    fn new(pool: &'a ParserPool, parser: XmlParser) -> Self {
        Self {
            pool,
            parser: Some(parser),
        }
    }
}

impl Deref for PooledParser<'_> {
    type Target = XmlParser;

    fn deref(&self) -> &XmlParser {
        // Only `drop` takes the parser out.
        self.parser.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledParser<'_> {
    fn deref_mut(&mut self) -> &mut XmlParser {
        self.parser.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.give_back(parser);
        }
    }
}
