pub use self::figure::*;

mod figure;
