pub use self::{analysis::*, fit::*, kernels::*, likelihood::*};

mod analysis;
mod fit;
mod kernels;
mod likelihood;
