pub mod matcher;
pub mod urls;

pub use matcher::SpriteIndex;
pub use urls::SpriteUrls;
