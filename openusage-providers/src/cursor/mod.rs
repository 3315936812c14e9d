//! Cursor provider implementation.
//!
//! Cursor keeps its session in the editor's `state.vscdb` (`ItemTable`
//! keys `cursorAuth/accessToken` and `cursorAuth/refreshToken`). The
//! access token is a JWT whose `exp` claim drives refreshes; refreshed
//! tokens are written back to the same database.

// Modules
mod api;
mod credentials;
mod descriptor;
pub(crate) mod parser;
mod probe;

// Re-exports
pub use api::USAGE_URL;
pub use credentials::{CursorCodec, cursor_auth, state_db_path};
pub use descriptor::cursor_descriptor;
pub use probe::CursorUsageProbe;
