pub mod ask;
pub mod embed;
pub mod proxy;
