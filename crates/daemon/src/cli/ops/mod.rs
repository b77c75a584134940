pub mod auth;
pub mod health;
pub mod init;
pub mod sfs;
pub mod version;

pub use auth::Auth;
pub use health::Health;
pub use init::Init;
pub use sfs::Sfs;
pub use version::Version;
