pub mod error;
pub mod sample;
pub mod sub_packet;
pub mod telemetry;

pub use error::*;
pub use sample::*;
pub use sub_packet::*;
pub use telemetry::*;
