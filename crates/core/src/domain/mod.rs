pub mod contract;
pub mod credential;
pub mod recommendation;
