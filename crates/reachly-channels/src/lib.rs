//! # Reachly Channels
//! Outbound messaging implementations of `MessageSender`.

pub mod whatsapp;

pub use whatsapp::WhatsAppChannel;
