pub mod admin;
pub mod assets;
pub mod data;
pub mod health;
pub mod index;
pub mod live;
