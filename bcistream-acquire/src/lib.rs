pub mod config;
pub mod device;
pub mod drain;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod transport;

pub use config::*;
pub use device::*;
pub use drain::*;
pub use error::*;
pub use metrics::*;
pub use pipeline::*;
pub use transport::*;
