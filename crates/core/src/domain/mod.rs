pub mod offer;
pub mod request;
