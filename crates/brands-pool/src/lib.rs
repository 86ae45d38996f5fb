#![doc = include_str!("../README.md")]

mod dispatch;
mod error;
mod lifecycle;
mod pool;
mod worker;


pub use crate::error::*;
pub use crate::pool::WorkerPool;
pub use crate::worker::{Task, WorkerId};
