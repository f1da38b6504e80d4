pub mod storage;
pub mod version;

pub use storage::StateStore;
pub use version::VersionClient;
