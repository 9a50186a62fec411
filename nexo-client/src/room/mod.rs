mod room_command;
mod room_controller;
mod room_event;
mod room_handle;
mod topology_cache;

pub use room_command::*;
pub use room_controller::*;
pub use room_event::*;
pub use room_handle::*;
pub use topology_cache::*;
