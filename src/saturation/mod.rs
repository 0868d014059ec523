pub use self::fit::*;

mod fit;
