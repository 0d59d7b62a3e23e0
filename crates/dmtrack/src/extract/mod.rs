//! Event extraction from host calls
//!
//! Two independent paths produce [`DomainEvent`](crate::event::DomainEvent)s:
//! the structured path reads packet fields at configured offsets, the text
//! path runs chat lines through a set of grammars. The content filter sits
//! beside them and only decides whether a chat message is shown.

pub mod filter;
pub mod packet;
pub mod quality;
pub mod text;

pub use filter::{ContentFilter, DEFAULT_TERMS, FilterConfig};
pub use packet::{PacketFields, events_for, extract_packet, packet_hex, read_fields};
pub use quality::infer_quality;
pub use text::{TextExtractor, UNKNOWN_TARGET};
