//! Main-thread task dispatch
//!
//! Every point of contact with live inventories runs on one dedicated thread
//! that owns the [`World`]. Other threads post closures to it over a channel
//! and, when they need a result, await it through a oneshot.
//!
//! # Architecture
//!
//! ```text
//! async callers ──post/run──► mpsc ──► main thread (owns W: World)
//!       ▲                                     │
//!       └──────────── oneshot result ◄────────┘
//! ```
//!
//! A panicking task is caught and logged; it never takes the main thread
//! down with it.

use crate::types::DispatchError;
use crate::world::World;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::{mpsc, oneshot};

type Task<W> = Box<dyn FnOnce(&mut W) + Send + 'static>;

/// Handle to the thread that owns the world
///
/// Cloning the handle is cheap; the thread exits once every handle is
/// dropped and the queue drains.
pub struct MainThread<W: World> {
    sender: mpsc::UnboundedSender<Task<W>>,
}

impl<W: World> Clone for MainThread<W> {
    fn clone(&self) -> Self {
        MainThread {
            sender: self.sender.clone(),
        }
    }
}

impl<W: World> std::fmt::Debug for MainThread<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThread")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl<W: World> MainThread<W> {
    /// Start the main thread and move `world` onto it
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Spawn` if the OS refuses to start the thread.
    pub fn spawn(world: W) -> Result<Self, DispatchError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task<W>>();

        thread::Builder::new()
            .name("trade-main".to_string())
            .spawn(move || {
                let mut world = world;
                while let Some(task) = receiver.blocking_recv() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(&mut world)));
                    if outcome.is_err() {
                        tracing::error!("main-thread task panicked");
                    }
                }
                tracing::debug!("main thread stopped");
            })
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        Ok(MainThread { sender })
    }

    /// Queue `task` without waiting for it
    pub fn post<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut W) + Send + 'static,
    {
        self.sender
            .send(Box::new(task))
            .map_err(|_| DispatchError::Closed)
    }

    /// Run `task` on the main thread and wait for its result
    ///
    /// # Errors
    ///
    /// * `DispatchError::Closed` if the main thread is gone
    /// * `DispatchError::Aborted` if the task panicked before producing a result
    pub async fn run<F, R>(&self, task: F) -> Result<R, DispatchError>
    where
        F: FnOnce(&mut W) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.post(move |world| {
            // The caller may have given up waiting
            let _ = reply.send(task(world));
        })?;

        result.await.map_err(|_| DispatchError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemStack, Position};
    use crate::world::{InMemoryWorld, World};

    fn main_thread() -> MainThread<InMemoryWorld> {
        let mut world = InMemoryWorld::new();
        world.add_party(1, 9, Position::default());
        MainThread::spawn(world).unwrap()
    }

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let main = main_thread();
        let diamond = ItemStack::new("DIAMOND", 1);

        let d = diamond.clone();
        main.post(move |world| {
            world.give(1, &d, 10);
        })
        .unwrap();

        let count = main
            .run(move |world| world.party_inventory(1).map(|inv| inv.count(&diamond)))
            .await
            .unwrap();

        assert_eq!(count, Some(10));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_the_thread() {
        let main = main_thread();

        let aborted = main
            .run(|_world| -> u32 { panic!("boom") })
            .await;
        assert_eq!(aborted, Err(DispatchError::Aborted));

        let online = main.run(|world| world.is_online(1)).await;
        assert_eq!(online, Ok(true));
    }
}
