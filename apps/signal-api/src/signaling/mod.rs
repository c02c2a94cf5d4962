//! Room signaling: the join protocol, payload relay, and event delivery.

pub mod dispatcher;
pub mod events;
pub mod join;
pub mod relay;

pub use dispatcher::{DispatchError, Dispatcher, ManagementApiDispatcher};
pub use events::{EventName, JoinRoomRequest, RequestContext, SendPayloadRequest, SignalEvent};
pub use join::{join_room, JoinOptions, JoinOutcome, MAX_DEAD_POSITIONS};
pub use relay::{send_payload, RelayResponse};
