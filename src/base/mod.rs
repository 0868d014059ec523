pub use self::{errors::*, helpers::*, structs_and_traits::*};

mod errors;
mod helpers;
mod settings;
mod structs_and_traits;
