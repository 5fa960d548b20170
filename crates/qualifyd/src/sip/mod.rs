//! SIP over UDP: the transport the qualify service signals through.

pub mod transport;

pub use transport::UdpSignalling;
