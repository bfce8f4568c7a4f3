//! C1: the in-process event bus.

mod bus;

pub use bus::{Event, EventBus, EventHandler, HandlerId, SubscriptionToken, RESERVED_DEADLOCK};
