pub mod ap;
pub mod crypto;
pub mod harvest;
pub mod interface;
