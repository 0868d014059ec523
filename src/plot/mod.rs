pub use self::plot::*;

mod plot;
