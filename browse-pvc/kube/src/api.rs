pub mod claim;
pub mod container;
pub mod kubernetes;
pub mod lifecycle;
pub mod owner;
