pub mod connect;

pub use connect::{
    ActiveConnection, ConnectionRequest, Message, NewConnectionRequest, PeerProfile, RequestStatus,
};
