pub mod attribute;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod quirks;
pub mod resource;
pub mod session;
pub mod status;
pub mod transport;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
