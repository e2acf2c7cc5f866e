#![cfg_attr(not(test), no_std)]

pub mod cycle;
pub mod drive;
pub mod estimate;
pub mod hardware;
pub mod path;
pub mod pose;
