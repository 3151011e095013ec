//! Synchronous change notifications.
//!
//! Handlers run in-line with the mutation that raised the event. The handler
//! list is copied before dispatch, so a handler may subscribe, unsubscribe or
//! mutate the tree without invalidating the iteration.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

/// Change raised by a group, or forwarded to its database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    EntryAboutToAdd { group: Uuid, entry: Uuid },
    EntryAdded { group: Uuid, entry: Uuid },
    EntryAboutToRemove { group: Uuid, entry: Uuid },
    EntryRemoved { group: Uuid, entry: Uuid },
    EntryDataChanged { group: Uuid, entry: Uuid },
    GroupAboutToAdd { group: Uuid, parent: Uuid, index: usize },
    GroupAdded { group: Uuid },
    GroupAboutToRemove { group: Uuid },
    GroupRemoved { group: Uuid },
    GroupAboutToMove { group: Uuid, parent: Uuid, index: usize },
    GroupMoved { group: Uuid },
    GroupDataChanged { group: Uuid },
    Modified { group: Uuid },
}

/// Handle returned by `subscribe`, used to unsubscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&TreeEvent)>;

/// List of registered handlers.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(SubscriptionId, Handler)>>,
}

impl Observers {
    pub(crate) fn subscribe(&self, handler: impl Fn(&TreeEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Returns whether a handler was registered under `id`.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub(crate) fn notify(&self, event: &TreeEvent) {
        let snapshot: Vec<Handler> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("handlers", &self.handlers.borrow().len())
            .finish()
    }
}
