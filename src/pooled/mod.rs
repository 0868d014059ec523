pub use self::{analysis::*, combine::*, stats::*};

mod analysis;
mod combine;
mod stats;
