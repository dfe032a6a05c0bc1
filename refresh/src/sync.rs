use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::future::Future;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::atomic::{self, AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};

/// A reader-writer lock built on `parking_lot::RwLock` whose write side can
/// also be acquired from async code without parking the OS thread.
///
/// Blocking callers use `read`/`write` as usual. An async writer that finds the
/// lock taken registers its waker; every guard release (read or write) wakes
/// all registered writers so they can race for the lock again.
#[derive(Debug, Default)]
pub(crate) struct HybridRwLock<T> {
  inner: RwLock<T>,
  parked: ParkedWriters,
}

#[derive(Debug, Default)]
struct ParkedWriters {
  // Mirrors `wakers.len()` so releases can skip the mutex when nobody waits.
  count: AtomicUsize,
  wakers: Mutex<Vec<Waker>>,
}

impl ParkedWriters {
  fn wake_all(&self) {
    // Pairs with the fence in `WriteFuture::poll`: either the releaser sees
    // the parked count, or the writer's retry sees the lock released.
    atomic::fence(Ordering::SeqCst);
    if self.count.load(Ordering::SeqCst) == 0 {
      return;
    }
    let wakers = {
      let mut wakers = self.wakers.lock();
      self.count.store(0, Ordering::SeqCst);
      mem::take(&mut *wakers)
    };
    for waker in wakers {
      waker.wake();
    }
  }
}

impl<T> HybridRwLock<T> {
  pub(crate) fn new(data: T) -> Self {
    Self {
      inner: RwLock::new(data),
      parked: ParkedWriters::default(),
    }
  }

  /// Acquires shared access, blocking the thread if a writer holds the lock.
  pub(crate) fn read(&self) -> ReadGuard<'_, T> {
    ReadGuard {
      guard: self.inner.read(),
      _release: Release(&self.parked),
    }
  }

  /// Acquires exclusive access, blocking the thread until it is available.
  pub(crate) fn write(&self) -> WriteGuard<'_, T> {
    WriteGuard {
      guard: self.inner.write(),
      _release: Release(&self.parked),
    }
  }

  /// Acquires exclusive access without blocking the executor thread.
  pub(crate) fn write_async(&self) -> WriteFuture<'_, T> {
    WriteFuture { lock: self }
  }

  fn try_write(&self) -> Option<WriteGuard<'_, T>> {
    self.inner.try_write().map(|guard| WriteGuard {
      guard,
      _release: Release(&self.parked),
    })
  }
}

/// Wakes parked async writers when dropped. Declared after the inner guard in
/// both guard types so that field drop order releases the lock first.
#[derive(Debug)]
struct Release<'a>(&'a ParkedWriters);

impl Drop for Release<'_> {
  fn drop(&mut self) {
    self.0.wake_all();
  }
}

#[derive(Debug)]
pub(crate) struct ReadGuard<'a, T> {
  guard: RwLockReadGuard<'a, T>,
  _release: Release<'a>,
}

impl<T> Deref for ReadGuard<'_, T> {
  type Target = T;
  fn deref(&self) -> &T {
    &self.guard
  }
}

#[derive(Debug)]
pub(crate) struct WriteGuard<'a, T> {
  guard: RwLockWriteGuard<'a, T>,
  _release: Release<'a>,
}

impl<T> Deref for WriteGuard<'_, T> {
  type Target = T;
  fn deref(&self) -> &T {
    &self.guard
  }
}

impl<T> DerefMut for WriteGuard<'_, T> {
  fn deref_mut(&mut self) -> &mut T {
    &mut self.guard
  }
}

/// The future returned by [`HybridRwLock::write_async`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub(crate) struct WriteFuture<'a, T> {
  lock: &'a HybridRwLock<T>,
}

impl<'a, T> Future for WriteFuture<'a, T> {
  type Output = WriteGuard<'a, T>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let lock = self.lock;
    if let Some(guard) = lock.try_write() {
      return Poll::Ready(guard);
    }

    let mut wakers = lock.parked.wakers.lock();
    // Announce ourselves before retrying so a release that happens in between
    // is guaranteed to see us.
    lock.parked.count.fetch_add(1, Ordering::SeqCst);
    atomic::fence(Ordering::SeqCst);

    if let Some(guard) = lock.try_write() {
      lock.parked.count.fetch_sub(1, Ordering::SeqCst);
      return Poll::Ready(guard);
    }

    if wakers.iter().any(|w| w.will_wake(cx.waker())) {
      lock.parked.count.fetch_sub(1, Ordering::SeqCst);
    } else {
      wakers.push(cx.waker().clone());
    }
    Poll::Pending
  }
}
