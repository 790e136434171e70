pub mod commands;
pub mod connectivity;
pub mod dto;
pub mod sync_queue;
pub mod time;
