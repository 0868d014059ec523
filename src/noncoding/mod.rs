pub use self::{analysis::*, features::*};

mod analysis;
mod features;
