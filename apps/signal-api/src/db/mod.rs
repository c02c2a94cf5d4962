pub mod redis_store;
pub mod rooms;

pub use redis_store::RedisRoomStore;
pub use rooms::{MemoryRoomStore, RemovalOutcome, RoomSnapshot, RoomStore};
