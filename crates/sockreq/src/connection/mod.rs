//! Socket connections carrying virtual requests.

mod pending;
mod socket;
mod state;

pub use pending::PendingResponse;
pub use socket::SocketConnection;
pub use state::ConnectionState;
