//! Event predicates decide whether a change notification triggers a pass.

use crate::event::WatchEvent;
use crate::resource::Resource;

/// Filter applied by the watch layer before a pass is scheduled.
pub trait EventPredicate<R>: Send + Sync {
    fn admit(&self, event: &WatchEvent<R>) -> bool;
}

/// Generation-based filters for update events.
///
/// Create and delete events are always admitted. For updates the two
/// variants differ only in how they compare the old and new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPredicate {
    /// Admit updates whose generation changed, i.e. spec changes.
    /// Status-only writes (including a controller's own) are dropped.
    GenerationChanged,
    /// Admit only updates whose generation did not change, i.e. writes to
    /// status or metadata.
    GenerationUnchanged,
}

impl<R: Resource> EventPredicate<R> for GenerationPredicate {
    fn admit(&self, event: &WatchEvent<R>) -> bool {
        match event {
            WatchEvent::Created(_) | WatchEvent::Deleted(_) => true,
            WatchEvent::Updated { old, new } => {
                let changed = old.meta().generation != new.meta().generation;
                match self {
                    GenerationPredicate::GenerationChanged => changed,
                    GenerationPredicate::GenerationUnchanged => !changed,
                }
            }
        }
    }
}

/// Admits every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl<R> EventPredicate<R> for AdmitAll {
    fn admit(&self, _event: &WatchEvent<R>) -> bool {
        true
    }
}
