//! # Frames in flight
//!
//! The device may still execute frame `f - 1` (and more) while the host prepares frame `f`. Every resource the host changes per frame
//! therefore exists once per in-flight slot. [InFlightSet] is that replication: a fixed number of entries, created once, selected by
//! `frame mod count`.

use std::ops::Index;

use crate::{
    error::{ConfigurationError, FrameError},
    presentation::Window,
};

///Fixed length set of `T`, one per in-flight slot. Entries are never reallocated or replaced after creation, only their content
/// can change.
#[derive(Debug)]
pub struct InFlightSet<T> {
    entries: Vec<T>,
}

impl<T> InFlightSet<T> {
    ///Calls `factory(index)` for every `index` in `0..count`.
    pub fn new(
        count: usize,
        mut factory: impl FnMut(usize) -> T,
    ) -> Result<Self, ConfigurationError> {
        Self::try_new(count, |idx| Ok::<T, ConfigurationError>(factory(idx)))
    }

    ///Same as [Self::new] for a fallible factory. Stops at the first error.
    pub fn try_new<E: From<ConfigurationError>>(
        count: usize,
        factory: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E> {
        if count == 0 {
            return Err(ConfigurationError::ZeroFramesInFlight.into());
        }

        let entries = (0..count).map(factory).collect::<Result<Vec<_>, E>>()?;
        Ok(InFlightSet { entries })
    }

    ///Creates one entry per in-flight slot of `window`.
    pub fn for_window(
        window: &dyn Window,
        factory: impl FnMut(usize) -> Result<T, FrameError>,
    ) -> Result<Self, FrameError> {
        Self::try_new(window.frames_in_flight(), factory)
    }

    ///Number of entries, which is the number of frames in flight. Never zero.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    ///Slot index used for `frame`.
    pub fn index_for(&self, frame: u64) -> usize {
        (frame % self.entries.len() as u64) as usize
    }

    ///Entry used for `frame`.
    pub fn current(&self, frame: u64) -> &T {
        &self.entries[self.index_for(frame)]
    }

    pub fn current_mut(&mut self, frame: u64) -> &mut T {
        let idx = self.index_for(frame);
        &mut self.entries[idx]
    }

    pub fn at(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.entries.iter_mut()
    }
}

impl<T> Index<usize> for InFlightSet<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl<'a, T> IntoIterator for &'a InFlightSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(InFlightSet<u32>: Send, Sync);
    }

    #[test]
    fn exactly_count_distinct_entries() {
        for count in 1..5 {
            let set = InFlightSet::new(count, |idx| idx * 10).unwrap();
            assert_eq!(set.len(), count);
            let collected: Vec<_> = set.iter().copied().collect();
            assert_eq!(collected, (0..count).map(|i| i * 10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn current_rotates() {
        let set = InFlightSet::new(3, |idx| idx).unwrap();
        for k in 0..20u64 {
            assert_eq!(set.current(k), set.current(k + 3));
            assert_eq!(*set.current(k), (k % 3) as usize);
        }
        assert_eq!(set.at(3), None);
        assert_eq!(set[2], 2);
    }

    #[test]
    fn zero_is_a_configuration_error() {
        assert_eq!(
            InFlightSet::new(0, |idx| idx).unwrap_err(),
            ConfigurationError::ZeroFramesInFlight
        );

        let err = InFlightSet::<u32>::try_new(0, |_| Ok::<_, FrameError>(1)).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Configuration(ConfigurationError::ZeroFramesInFlight)
        ));
    }

    #[test]
    fn failing_factory_stops() {
        let mut calls = 0;
        let res = InFlightSet::<u32>::try_new(4, |idx| {
            calls += 1;
            if idx == 1 {
                Err(FrameError::Other("factory failed".to_owned()))
            } else {
                Ok(idx as u32)
            }
        });
        assert!(res.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn content_can_change() {
        let mut set = InFlightSet::new(2, |_| 0u32).unwrap();
        *set.current_mut(3) = 7;
        assert_eq!(set[1], 7);
        assert_eq!(set[0], 0);
        if let Some(v) = set.at_mut(0) {
            *v = 1;
        }
        assert_eq!(*set.current(4), 1);
    }
}
