mod arc_mutex;
mod barrier;
mod cond_var;
mod once_cell;
mod rw_arc_mutex;

pub use self::{arc_mutex::*, barrier::*, cond_var::*, once_cell::*, rw_arc_mutex::*};
