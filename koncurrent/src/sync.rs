pub(crate) mod ref_count;
mod shared;
mod shared_arc;

pub use self::{shared::*, shared_arc::*};
