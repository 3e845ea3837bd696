mod handler;
mod message;
mod origin;
mod session;

pub use handler::{ws_handler, JoinRequest, WsQuery};
pub use message::{ErrorFrame, RequiredAttribute};
pub use origin::{validate_origin, OriginRejection};
pub use session::{LoopExit, RelaySession, SessionOptions};
