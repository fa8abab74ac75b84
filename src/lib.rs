pub mod callback;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod tree;
