pub mod capture;
pub mod detection;
pub mod identity;
pub mod recognition;
pub mod shared;
