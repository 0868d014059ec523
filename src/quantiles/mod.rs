pub use self::{entropy::*, prepare::*};

mod entropy;
mod prepare;
