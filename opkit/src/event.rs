//! Change notifications emitted by a resource store.

use crate::resource::{ObjectKey, Resource};

/// A change to a stored resource.
#[derive(Debug, Clone)]
pub enum WatchEvent<R> {
    /// A resource was created.
    Created(R),
    /// A resource was written (spec or status).
    Updated { old: R, new: R },
    /// A resource was removed from the store.
    Deleted(R),
}

impl<R: Resource> WatchEvent<R> {
    /// Key of the resource this event refers to.
    pub fn key(&self) -> ObjectKey {
        self.object().key()
    }

    /// The most recent version of the resource carried by the event.
    pub fn object(&self) -> &R {
        match self {
            WatchEvent::Created(obj) | WatchEvent::Deleted(obj) => obj,
            WatchEvent::Updated { new, .. } => new,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Created(_) => "created",
            WatchEvent::Updated { .. } => "updated",
            WatchEvent::Deleted(_) => "deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ObjectMeta;

    #[derive(Debug, Clone)]
    struct Obj(ObjectMeta);

    impl Resource for Obj {
        fn meta(&self) -> &ObjectMeta {
            &self.0
        }

        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.0
        }
    }

    fn obj(generation: i64) -> Obj {
        let mut meta = ObjectMeta::new("prod", "api");
        meta.generation = generation;
        Obj(meta)
    }

    #[test]
    fn test_updated_event_carries_new_object() {
        let event = WatchEvent::Updated {
            old: obj(1),
            new: obj(2),
        };
        assert_eq!(event.object().meta().generation, 2);
        assert_eq!(event.key(), ObjectKey::new("prod", "api"));
        assert_eq!(event.kind(), "updated");
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(WatchEvent::Created(obj(1)).kind(), "created");
        assert_eq!(WatchEvent::Deleted(obj(1)).kind(), "deleted");
        assert_eq!(WatchEvent::Deleted(obj(3)).object().meta().generation, 3);
    }
}
