//! Message relay module
//!
//! Connection lifecycle, room fan-out and user-to-user routing on top of the
//! shared registry.

mod broadcast;
mod delivery;
mod dispatcher;
mod lifecycle;
mod unicast;

pub use broadcast::*;
pub use delivery::*;
pub use dispatcher::*;
pub use lifecycle::*;
pub use unicast::*;
