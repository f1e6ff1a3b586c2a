pub mod assemble;
pub mod classify;
pub mod consts;
pub mod coords;
pub mod error;
pub mod io;
pub mod organize;
pub mod pipeline;
pub mod plane;
pub mod stack;
