pub mod connection;
pub mod mesh;

pub use connection::PeerChannel;
