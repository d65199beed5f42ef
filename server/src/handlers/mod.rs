pub mod echo;

pub use echo::{EchoResponse, echo};
