// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Thread-aware locks guarding invocation handling and open blocks.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::error::MockError;

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

/// A reentrant lock owned by one thread at a time.
///
/// The owning thread may lock again without blocking; other threads wait
/// until every guard of the owner is dropped.
#[derive(Debug, Default)]
pub struct ThreadLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

impl ThreadLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock, blocking while another thread holds it.
    pub fn lock(&self) -> ThreadLockGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        loop {
            match owner.thread {
                None => {
                    owner.thread = Some(me);
                    owner.depth = 1;
                    break;
                }
                Some(holder) if holder == me => {
                    owner.depth += 1;
                    break;
                }
                Some(_) => self.released.wait(&mut owner),
            }
        }
        ThreadLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// True when the calling thread holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.lock().thread == Some(thread::current().id())
    }

    /// True when any thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.owner.lock().thread.is_some()
    }

    fn unlock(&self) {
        let mut owner = self.owner.lock();
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.released.notify_one();
        }
    }
}

/// Releases one level of a [`ThreadLock`] on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ThreadLockGuard<'a> {
    lock: &'a ThreadLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ThreadLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Tracks which thread has a record or verification block open.
#[derive(Debug, Default)]
pub(crate) struct BlockOwner {
    thread: Mutex<Option<ThreadId>>,
}

impl BlockOwner {
    pub(crate) fn acquire(&self) -> Result<(), MockError> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return Err(MockError::illegal_state("a record or verification block is already open"));
        }
        *thread = Some(thread::current().id());
        Ok(())
    }

    pub(crate) fn release(&self) {
        *self.thread.lock() = None;
    }

    pub(crate) fn is_owned_by_other_thread(&self) -> bool {
        self.thread
            .lock()
            .is_some_and(|owner| owner != thread::current().id())
    }
}
