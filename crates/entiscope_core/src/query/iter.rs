//! Chunked result iterators used by hybrid and normal queries.

use super::engine::KeyResults;
use crate::error::{CoreError, CoreResult};
use crate::load::{known, LoadEngine};
use crate::scope::Scope;
use crate::session::SessionValue;
use entiscope_store::{Key, QueryResults, RawEntity};
use std::collections::VecDeque;

/// Turns a key scan into entities by loading `chunk_size` keys at a time.
///
/// Entities come out in scan order. Keys that resolve absent are skipped.
pub(crate) struct ChunkingIter<'a> {
    scope: &'a Scope,
    keys: KeyResults<'a>,
    chunk_size: usize,
    buffer: VecDeque<RawEntity>,
    done: bool,
    error: Option<CoreError>,
}

impl<'a> ChunkingIter<'a> {
    pub(crate) fn new(scope: &'a Scope, keys: KeyResults<'a>, chunk_size: usize) -> Self {
        Self {
            scope,
            keys,
            chunk_size,
            buffer: VecDeque::new(),
            done: false,
            error: None,
        }
    }

    fn next_chunk(&mut self) -> Vec<Key> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.keys.next() {
                Some(Ok(key)) => chunk.push(key),
                Some(Err(err)) => {
                    self.error = Some(err);
                    self.done = true;
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        chunk
    }
}

impl Iterator for ChunkingIter<'_> {
    type Item = CoreResult<RawEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                return Some(Ok(raw));
            }
            if self.done {
                return self.error.take().map(Err);
            }

            let chunk = self.next_chunk();
            if chunk.is_empty() {
                continue;
            }
            match LoadEngine::new(self.scope).load(&chunk) {
                Ok(mut found) => {
                    self.buffer
                        .extend(chunk.iter().filter_map(|key| found.remove(key)));
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Passes full query results through the session `chunk_size` at a time.
///
/// Entities the scope already knows are replaced by its version; entities the session knows to be absent are skipped; the rest
/// are recorded in the session as they go by.
pub(crate) struct StuffingIter<'a> {
    scope: &'a Scope,
    results: QueryResults,
    chunk_size: usize,
    buffer: VecDeque<RawEntity>,
    done: bool,
    error: Option<CoreError>,
}

impl<'a> StuffingIter<'a> {
    pub(crate) fn new(scope: &'a Scope, results: QueryResults, chunk_size: usize) -> Self {
        Self {
            scope,
            results,
            chunk_size,
            buffer: VecDeque::new(),
            done: false,
            error: None,
        }
    }

    fn stuff(&mut self, chunk: Vec<RawEntity>) {
        for raw in chunk {
            match known(self.scope, raw.key()) {
                Some(SessionValue::Present(existing)) => self.buffer.push_back(existing),
                Some(SessionValue::Absent) => {}
                None => {
                    self.scope.session().borrow_mut().put_entity(raw.clone());
                    self.buffer.push_back(raw);
                }
            }
        }
    }
}

impl Iterator for StuffingIter<'_> {
    type Item = CoreResult<RawEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                return Some(Ok(raw));
            }
            if self.done {
                return self.error.take().map(Err);
            }

            let mut chunk = Vec::with_capacity(self.chunk_size);
            while chunk.len() < self.chunk_size {
                match self.results.next() {
                    Some(Ok(raw)) => chunk.push(raw),
                    Some(Err(err)) => {
                        self.error = Some(err.into());
                        self.done = true;
                        break;
                    }
                    None => {
                        self.done = true;
                        break;
                    }
                }
            }
            self.stuff(chunk);
        }
    }
}
