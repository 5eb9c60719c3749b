pub mod contract;
pub mod sales;
pub mod summary;
