//! Typed per-schedule storage for pass parameters.

use std::any::Any;
use std::marker::PhantomData;

/// Handle to a value stored in a schedule's user-data arena.
///
/// Pass executors capture the handle and get the value back through
/// [`PassExecutionContext::user_data`](crate::PassExecutionContext::user_data).
pub struct UserData<T> {
    index: u32,
    schedule: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> UserData<T> {
    /// Slot index within the arena.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<T> Clone for UserData<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for UserData<T> {}

impl<T> PartialEq for UserData<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.schedule == other.schedule
    }
}

impl<T> Eq for UserData<T> {}

impl<T> std::fmt::Debug for UserData<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserData")
            .field("type", &std::any::type_name::<T>())
            .field("index", &self.index)
            .finish()
    }
}

/// Slot arena holding every user-data value of one schedule build.
///
/// Slots are dropped together on reset; the slot vector keeps its capacity
/// for the next frame.
#[derive(Default)]
pub(crate) struct UserDataArena {
    slots: Vec<Box<dyn Any + Send>>,
}

impl UserDataArena {
    pub(crate) fn allocate<T: Any + Send>(&mut self, schedule: u32, value: T) -> UserData<T> {
        let index = self.slots.len() as u32;
        self.slots.push(Box::new(value));
        UserData {
            index,
            schedule,
            _marker: PhantomData,
        }
    }

    /// # Panics
    ///
    /// Panics if the handle belongs to another schedule build.
    pub(crate) fn get_mut<T: Any>(&mut self, schedule: u32, handle: UserData<T>) -> &mut T {
        assert!(
            handle.schedule == schedule,
            "user data {handle:?} belongs to another schedule"
        );
        self.slots
            .get_mut(handle.index as usize)
            .and_then(|slot| slot.downcast_mut::<T>())
            .unwrap_or_else(|| panic!("invalid user data handle {handle:?}"))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}

impl std::fmt::Debug for UserDataArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataArena")
            .field("slots", &self.slots.len())
            .finish()
    }
}
