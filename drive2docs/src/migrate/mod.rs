pub mod engine;
pub mod export;
pub mod folders;
pub mod guard;
pub mod hierarchy;
pub mod local;
pub mod paths;
pub mod transfer;
