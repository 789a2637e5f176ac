pub mod connect;
pub mod key;
pub mod registry;
pub mod token;
