pub mod channels;
pub mod interface;
pub mod mac;
