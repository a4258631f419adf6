//! WebSocket server delivering attendance notices in real time.
//!
//! Clients join rooms (`user:<id>`, `role:faculty`) and receive every notice
//! addressed to a room they are in. Notices enter through [`NotificationHub`],
//! which plugs into the pipeline's event bus as an ordinary listener.

pub mod hub;
pub mod rooms;
pub mod server;

pub use hub::{NotificationHub, RoomEvent};
pub use rooms::{ClientMessage, ClientRooms, ServerMessage};
pub use server::{router, WebSocketServer, WsError};
