pub mod chat;
pub mod viewer;
