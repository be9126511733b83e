//! Вспомогательные модули

pub mod process;
pub mod temp;
