//! Types exchanged with callers and with the voting service.

pub mod poll;
pub mod position;
