pub mod decode;
pub mod layout;
pub mod mock;
pub mod reader;

pub use decode::{
    BufferAccess, FieldKind, FieldSpec, StringStorage, decode_narrow, hex_prefix,
    parse_msvc_string, read_c_string, read_field, read_msvc_string, read_packet_span,
};
pub use mock::{MockMemoryBuilder, MockMemoryReader};
pub use reader::{LocalMemory, ReadMemory, check_plausible, is_plausible};
