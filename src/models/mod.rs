pub mod chat;
pub mod course;
pub mod user;
pub mod websocket;
